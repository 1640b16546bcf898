//! In-process bus workers emit metrics events on.

use std::sync::mpsc::{channel, Receiver, SendError, Sender};

use crate::telemetry::events::MetricsEvent;

#[derive(Clone)]
pub struct MetricsBus {
    sender: Sender<MetricsEvent>,
}

impl MetricsBus {
    pub fn new_pair() -> (Self, Receiver<MetricsEvent>) {
        let (sender, receiver) = channel();
        (Self { sender }, receiver)
    }

    pub fn emit(&self, event: MetricsEvent) -> Result<(), SendError<MetricsEvent>> {
        self.sender.send(event)
    }
}
