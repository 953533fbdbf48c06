// src/core/events.rs

//! Messages flowing from background threads back to the thread owning a coordinator.

use crate::core::introspection::IntrospectionError;
use crate::core::orchestrator::ParserOutput;
use crate::system::executor::{ProcessCallback, ProcessEvent};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::SystemTime;

#[derive(Debug)]
pub enum Event {
    Process(ProcessEvent),
    ParseFinished(Box<Result<ParserOutput, IntrospectionError>>),
    InfoFileChanged { modified: SystemTime },
}

/// What a finished cycle reports to the owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    ParsingCompleted(bool),
    BuildCompleted(bool),
}

pub type EventSender = Sender<Event>;
pub type EventReceiver = Receiver<Event>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::channel()
}

/// Adapts the channel into the callback shape the process runner expects.
pub fn process_callback(sender: &EventSender) -> ProcessCallback {
    let sender = sender.clone();
    Arc::new(move |event| {
        // The receiver is gone only when the coordinator was dropped mid-run.
        let _ = sender.send(Event::Process(event));
    })
}
