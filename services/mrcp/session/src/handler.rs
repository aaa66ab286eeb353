//! Resource handler seam and the handler registry.

use crate::context::RequestContext;
use async_trait::async_trait;
use mrcp_wire::{ChannelIdentifier, Message, ResourceType};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Serves the requests of one channel.
///
/// `handle` returns the terminal (`COMPLETE`) message for the request;
/// interim responses and events go out through the context first. Any error
/// is answered with 501.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// Serve one request
    async fn handle(&self, request: Message, ctx: RequestContext) -> anyhow::Result<Message>;
}

/// Creates a handler when a channel is first allocated
pub trait ResourceHandlerFactory: Send + Sync {
    /// Build the handler for `channel`
    fn create(&self, channel: &ChannelIdentifier) -> anyhow::Result<Arc<dyn ResourceHandler>>;
}

impl<F> ResourceHandlerFactory for F
where
    F: Fn(&ChannelIdentifier) -> anyhow::Result<Arc<dyn ResourceHandler>> + Send + Sync,
{
    fn create(&self, channel: &ChannelIdentifier) -> anyhow::Result<Arc<dyn ResourceHandler>> {
        self(channel)
    }
}

/// Resource type → handler factory. Built before serving and shared
/// read-only by every session.
#[derive(Default)]
pub struct HandlerRegistry {
    factories: HashMap<ResourceType, Arc<dyn ResourceHandlerFactory>>,
}

impl HandlerRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory; replaces any earlier one for the same type
    pub fn register(&mut self, resource: ResourceType, factory: impl ResourceHandlerFactory + 'static) {
        self.factories.insert(resource, Arc::new(factory));
    }

    /// Register an infallible constructor
    pub fn register_handler<H, F>(&mut self, resource: ResourceType, make: F)
    where
        H: ResourceHandler + 'static,
        F: Fn(&ChannelIdentifier) -> H + Send + Sync + 'static,
    {
        self.register(
            resource,
            move |channel: &ChannelIdentifier| -> anyhow::Result<Arc<dyn ResourceHandler>> {
                Ok(Arc::new(make(channel)))
            },
        );
    }

    /// Factory for a resource type
    pub fn get(&self, resource: ResourceType) -> Option<&Arc<dyn ResourceHandlerFactory>> {
        self.factories.get(&resource)
    }

    /// Whether a resource type can be served
    pub fn supports(&self, resource: ResourceType) -> bool {
        self.factories.contains_key(&resource)
    }

    /// Registered resource types, in declaration order
    pub fn resource_types(&self) -> Vec<ResourceType> {
        let mut types: Vec<_> = self.factories.keys().copied().collect();
        types.sort();
        types
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("resources", &self.resource_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mrcp_wire::{RequestState, StatusCode};

    struct Ok200;

    #[async_trait]
    impl ResourceHandler for Ok200 {
        async fn handle(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
            Ok(ctx.response(StatusCode::Success, RequestState::Complete).build()?)
        }
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = HandlerRegistry::new();
        assert!(registry.is_empty());
        registry.register(
            ResourceType::SpeechSynth,
            |_: &ChannelIdentifier| -> anyhow::Result<Arc<dyn ResourceHandler>> {
                Ok(Arc::new(Ok200))
            },
        );
        registry.register_handler(ResourceType::DtmfRecog, |_| Ok200);

        assert!(registry.supports(ResourceType::SpeechSynth));
        assert!(!registry.supports(ResourceType::Recorder));
        assert_eq!(
            registry.resource_types(),
            vec![ResourceType::DtmfRecog, ResourceType::SpeechSynth]
        );

        let channel = ChannelIdentifier::new("1", ResourceType::SpeechSynth).unwrap();
        let factory = registry.get(ResourceType::SpeechSynth).unwrap();
        assert!(factory.create(&channel).is_ok());
    }

    #[test]
    fn test_failing_factory() {
        let mut registry = HandlerRegistry::new();
        registry.register(
            ResourceType::Recorder,
            |channel: &ChannelIdentifier| -> anyhow::Result<Arc<dyn ResourceHandler>> {
                anyhow::bail!("no recorder for {}", channel)
            },
        );
        let channel = ChannelIdentifier::new("r1", ResourceType::Recorder).unwrap();
        let err = registry
            .get(ResourceType::Recorder)
            .unwrap()
            .create(&channel)
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "no recorder for r1@recorder");
    }
}
