use std::sync::mpsc::{self, Receiver, Sender};

use log::warn;

/// One-way notifications from the render thread to the UI thread.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UiEvent {
    LoadingProgress(String),
    /// Setup finished; the loading indicator can go away.
    LoadingComplete,
    Alert(String),
    Recovering,
    Recovered,
    /// Terminal for this session. The loop will not start again.
    Failed(String),
}

/// The host UI's "post to UI context" capability. Implementations must return
/// without waiting for the UI thread to process the event.
pub trait UiContext: Send + Sync + 'static {
    fn post(&self, event: UiEvent);
}

pub type UiEventReceiver = Receiver<UiEvent>;

/// [`UiContext`] backed by a channel the UI thread drains from its own
/// dispatch loop.
#[derive(Clone)]
pub struct ChannelUiContext {
    tx: Sender<UiEvent>,
}

pub fn ui_channel() -> (ChannelUiContext, UiEventReceiver) {
    let (tx, rx) = mpsc::channel();
    (ChannelUiContext { tx }, rx)
}

impl UiContext for ChannelUiContext {
    fn post(&self, event: UiEvent) {
        if let Err(err) = self.tx.send(event) {
            warn!("UI context is gone; dropping {:?}", err.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posts_arrive_in_order() {
        let (ui, rx) = ui_channel();
        ui.post(UiEvent::LoadingProgress("stars".to_string()));
        ui.post(UiEvent::LoadingComplete);

        let events: Vec<UiEvent> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                UiEvent::LoadingProgress("stars".to_string()),
                UiEvent::LoadingComplete
            ]
        );
    }

    #[test]
    fn post_after_receiver_drop_is_harmless() {
        let (ui, rx) = ui_channel();
        drop(rx);
        ui.post(UiEvent::Recovering);
    }
}
