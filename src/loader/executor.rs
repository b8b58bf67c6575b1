//! Begrenzt paralleles Ausführen von Lade-Jobs.
//!
//! Jobs laufen auf eigenen Threads, Ergebnisse kommen über einen Kanal
//! zurück und werden ausschließlich auf dem aufrufenden Thread angewendet.

use anyhow::{anyhow, Context, Result};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread;

/// Ein Lade-Job; läuft auf einem Worker-Thread.
pub type LoadJob<T> = Box<dyn FnOnce() -> Result<T> + Send + 'static>;

/// Führt höchstens `parallelism` Jobs gleichzeitig aus.
pub struct Executor<T: Send + 'static> {
    parallelism: usize,
    queue: VecDeque<LoadJob<T>>,
    running: usize,
    sender: mpsc::Sender<Result<T>>,
    receiver: mpsc::Receiver<Result<T>>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl<T: Send + 'static> Executor<T> {
    /// Neuer Executor mit `parallelism` Slots (mindestens einem).
    pub fn new(parallelism: usize) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            parallelism: parallelism.max(1),
            queue: VecDeque::new(),
            running: 0,
            sender,
            receiver,
            handles: Vec::new(),
        }
    }

    /// Anzahl Slots.
    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Laufende Jobs.
    pub fn running(&self) -> usize {
        self.running
    }

    /// Wartende Jobs.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Reiht einen Job ein und startet ihn, sobald ein Slot frei ist.
    pub fn add(&mut self, job: impl FnOnce() -> Result<T> + Send + 'static) {
        self.queue.push_back(Box::new(job));
        self.fill_slots();
    }

    fn fill_slots(&mut self) {
        while self.running < self.parallelism {
            let Some(job) = self.queue.pop_front() else {
                break;
            };
            let sender = self.sender.clone();
            self.handles.push(thread::spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(job))
                    .unwrap_or_else(|_| Err(anyhow!("Lade-Job ist abgestürzt")));
                // Empfänger weg heißt: niemand wartet mehr
                let _ = sender.send(result);
            }));
            self.running += 1;
        }
    }

    /// Wartet, bis alle Jobs abgeschlossen sind.
    ///
    /// `apply` läuft für jedes erfolgreiche Ergebnis auf dem aufrufenden
    /// Thread. Fehlgeschlagene Jobs werden protokolliert, der erste Fehler
    /// wird nach dem Abschluss aller Jobs zurückgegeben.
    pub fn await_termination(&mut self, mut apply: impl FnMut(T) -> Result<()>) -> Result<usize> {
        let mut completed = 0;
        let mut first_error = None;

        while self.running > 0 {
            let result = self
                .receiver
                .recv()
                .context("Worker-Kanal unerwartet geschlossen")?;
            self.running -= 1;
            completed += 1;

            match result {
                Ok(value) => apply(value)?,
                Err(e) => {
                    log::error!("Lade-Job fehlgeschlagen: {:#}", e);
                    first_error.get_or_insert(e);
                }
            }
            self.fill_slots();
        }

        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                log::error!("Worker-Thread konnte nicht beendet werden");
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(completed),
        }
    }
}

impl<T: Send + 'static> std::fmt::Debug for Executor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("parallelism", &self.parallelism)
            .field("running", &self.running)
            .field("queued", &self.queue.len())
            .finish()
    }
}
