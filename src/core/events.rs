//! Viewer-Events und ein einfacher Publish/Subscribe-Bus.

use super::ObjectId;

/// RGBA-Farbe mit Komponenten in `[0, 1]`.
pub type Rgba = [f32; 4];

/// Vom Viewer gemeldete Zustandsänderungen.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    /// Sichtbarkeit von `ids` wurde gesetzt.
    VisibilityChanged { ids: Vec<ObjectId>, visible: bool },
    /// Selektionszustand von `ids` wurde gesetzt.
    SelectionStateChanged { ids: Vec<ObjectId>, selected: bool },
    /// Override-Farbe für `ids` wurde gesetzt.
    ColorChanged { ids: Vec<ObjectId>, rgba: Rgba },
}

/// Handle eines Abonnements (zum Abmelden).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(&ViewerEvent)>;

/// Verteilt Events synchron an alle Abonnenten in Anmelde-Reihenfolge.
#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    listeners: Vec<(SubscriptionId, Listener)>,
}

impl EventBus {
    /// Erstellt einen Bus ohne Abonnenten.
    pub fn new() -> Self {
        Self::default()
    }

    /// Meldet einen Listener an.
    pub fn subscribe(&mut self, listener: impl FnMut(&ViewerEvent) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Meldet einen Listener ab. Gibt `true` zurück, wenn er existierte.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sid, _)| *sid != id);
        self.listeners.len() != before
    }

    /// Verteilt ein Event.
    pub fn publish(&mut self, event: ViewerEvent) {
        log::debug!("Event: {:?}", event);
        for (_, listener) in &mut self.listeners {
            listener(&event);
        }
    }

    /// Anzahl angemeldeter Listener.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// `true`, wenn niemand zuhört.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
