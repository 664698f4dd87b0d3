use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};

use crate::error::CarouselError;
use crate::types::{BackendKind, LoadedImage};

/// Lifecycle notifications published by a carousel.
#[derive(Clone, Debug)]
pub enum CarouselEvent {
    Ready { backend: BackendKind },
    Error(Arc<CarouselError>),
    ImageLoaded { index: usize, image: Arc<LoadedImage> },
    AllImagesLoaded(Vec<Arc<LoadedImage>>),
    TransitionStart { from: usize, to: usize },
    TransitionEnd(usize),
    Play,
    Pause,
    ContextLost,
    ContextRestored,
}

/// Fan-out over unbounded channels. Subscribers that hang up are pruned on
/// the next publish.
#[derive(Default)]
pub(crate) struct EventBus {
    subscribers: Vec<Sender<CarouselEvent>>,
}

impl EventBus {
    pub fn subscribe(&mut self) -> Receiver<CarouselEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.push(tx);
        rx
    }

    pub fn publish(&mut self, event: CarouselEvent) {
        tracing::trace!(?event, "publishing carousel event");
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    pub fn clear(&mut self) {
        self.subscribers.clear();
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }
}
