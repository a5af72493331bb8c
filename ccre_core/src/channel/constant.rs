//! Constant inputs.

use super::{ChannelValue, Input, Listener, Output, Subscription, Updating, ValueListener};
use std::sync::Arc;

/// An input whose value never changes. Subscriptions are inert.
#[derive(Debug, Clone)]
pub struct Constant<T: ChannelValue> {
    value: T,
}

impl<T: ChannelValue> Constant<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }
}

impl<T: ChannelValue> Updating for Constant<T> {
    fn on_update(&self, _listener: Listener) -> Subscription {
        Subscription::noop()
    }
}

impl<T: ChannelValue> Input<T> for Constant<T> {
    fn get(&self) -> T {
        self.value.clone()
    }

    fn on_change(&self, _listener: ValueListener<T>) -> Subscription {
        Subscription::noop()
    }

    fn send(&self, target: Arc<dyn Output<T>>) -> Subscription {
        target.set(self.value.clone());
        Subscription::noop()
    }
}

/// Shared constant input.
pub fn constant<T: ChannelValue>(value: T) -> Arc<dyn Input<T>> {
    Arc::new(Constant::new(value))
}
