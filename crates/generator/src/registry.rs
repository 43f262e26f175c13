//! Lookup of variants, types, producers and serializers by identifier.

use crate::error::{ErrorKind, Result};
use crate::producer::{ArbitraryProducer, CustomLinkProducer, ProducerHandle};
use exn::OptionExt;
use sitemap_config::Settings;
use sitemap_model::{SitemapType, Variant};
use sitemap_render::{SerializerHandle, XmlSerializer};
use std::collections::HashMap;
use std::sync::Arc;

/// Everything the pipeline resolves by identifier.
///
/// Variants are kept in processing order (weight, then id).
#[derive(Clone)]
pub struct Registry {
    variants: Vec<Variant>,
    types: HashMap<String, SitemapType>,
    producers: HashMap<String, ProducerHandle>,
    serializers: HashMap<String, SerializerHandle>,
}

impl Default for Registry {
    /// An empty registry with only the XML serializer available.
    fn default() -> Self {
        Self {
            variants: Vec::new(),
            types: HashMap::new(),
            producers: HashMap::new(),
            serializers: HashMap::from([(XmlSerializer::ID.to_string(), Arc::new(XmlSerializer) as SerializerHandle)]),
        }
    }
}

impl From<&Settings> for Registry {
    /// Configured variants and types, the built-in `custom` and `arbitrary`
    /// producers, and the XML serializer.
    fn from(settings: &Settings) -> Self {
        let mut registry = Self::default()
            .with_producer(Arc::new(CustomLinkProducer::from(settings)))
            .with_producer(Arc::new(ArbitraryProducer::from(settings)));
        for sitemap_type in &settings.types {
            registry = registry.with_type(sitemap_type.clone());
        }
        for variant in &settings.variants {
            registry = registry.with_variant(variant.clone());
        }
        registry
    }
}

impl Registry {
    /// Add or replace a variant.
    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.variants.retain(|v| v.id != variant.id);
        self.variants.push(variant);
        Variant::sort(&mut self.variants);
        self
    }

    pub fn with_type(mut self, sitemap_type: SitemapType) -> Self {
        self.types.insert(sitemap_type.id.clone(), sitemap_type);
        self
    }

    pub fn with_producer(mut self, producer: ProducerHandle) -> Self {
        self.producers.insert(producer.id().to_string(), producer);
        self
    }

    pub fn with_serializer(mut self, serializer: SerializerHandle) -> Self {
        self.serializers.insert(serializer.id().to_string(), serializer);
        self
    }

    /// All variants in processing order.
    pub fn variants(&self) -> &[Variant] {
        &self.variants
    }

    pub fn variant(&self, id: &str) -> Result<&Variant> {
        self.variants.iter().find(|v| v.id == id).ok_or_raise(|| ErrorKind::UnknownVariant(id.to_string()))
    }

    pub fn sitemap_type(&self, variant: &Variant) -> Result<&SitemapType> {
        self.types.get(&variant.type_id).ok_or_raise(|| ErrorKind::UnknownType(variant.type_id.clone()))
    }

    pub fn producer(&self, id: &str) -> Result<&ProducerHandle> {
        self.producers.get(id).ok_or_raise(|| ErrorKind::UnknownProducer(id.to_string()))
    }

    /// The serializer configured for the variant's type.
    pub fn serializer(&self, variant: &Variant) -> Result<&SerializerHandle> {
        let sitemap_type = self.sitemap_type(variant)?;
        self.serializers
            .get(&sitemap_type.serializer)
            .ok_or_raise(|| ErrorKind::UnknownSerializer(sitemap_type.serializer.clone()))
    }
}
