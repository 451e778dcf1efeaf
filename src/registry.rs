//! Serializer resolution.
//!
//! [`SerializerRegistry::get`] resolves a type in three steps and remembers the outcome:
//!
//! 1. the per-type [`SerializerCache`];
//! 2. the [`RegistrationTable`], filled by the [`RegistryBuilder`] before first use;
//! 3. the [`DescriptorProvider`], whose descriptor is wrapped in a [`MessageSerializer`].
//!
//! A clean "no such type" from every source is cached as absence. A provider error is returned
//! to the caller and not cached, so a later call asks the provider again.

use crate::cache::{ResolutionCache, ResolutionState};
use crate::config::CodecConfig;
use crate::descriptor::{ScalarType, ShapeDescriptor, TypeIdentity, TypeRef};
use crate::parametrized::{ParametrizedKey, ParametrizedSerializerCache};
use crate::serializer::{
    Context, MessageSerializer, ScalarSerializer, Serializer, SharedSerializer,
};
use crate::value::Value;
use crate::wire::{WireReader, WireWriter};
use crate::{EncoderError, ResolutionError, Result};
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// What a [`DescriptorProvider`] answers for one type.
pub type DescriptorResult = std::result::Result<Option<Arc<ShapeDescriptor>>, ResolutionError>;

/// A serializer, a clean absence, or the error that prevented resolution.
pub type Resolution = std::result::Result<Option<SharedSerializer>, ResolutionError>;

/// Source of shape descriptors for types that are not in the registration table.
///
/// Implementations must be pure with respect to a fixed set of types: the registry calls them
/// at most once per successful resolution and caches the outcome forever.
pub trait DescriptorProvider: Send + Sync {
    /// The descriptor of a non-generic type, or `None` if the type is unknown.
    fn resolve_descriptor(&self, ty: &TypeIdentity) -> DescriptorResult;

    /// The descriptor of `base<args>`. The default knows no generic types.
    fn resolve_parametrized(&self, base: &TypeIdentity, args: &[TypeRef]) -> DescriptorResult {
        let _ = (base, args);
        Ok(None)
    }
}

impl<F> DescriptorProvider for F
where
    F: Fn(&TypeIdentity) -> DescriptorResult + Send + Sync,
{
    fn resolve_descriptor(&self, ty: &TypeIdentity) -> DescriptorResult {
        self(ty)
    }
}

type GenericFactory = Arc<
    dyn Fn(&[TypeRef]) -> std::result::Result<Option<ShapeDescriptor>, ResolutionError>
        + Send
        + Sync,
>;

/// A [`DescriptorProvider`] backed by descriptors known up front.
///
/// Generic types are described by a factory that builds the descriptor for given arguments.
#[derive(Clone, Default)]
pub struct DescriptorSet {
    descriptors: HashMap<TypeIdentity, Arc<ShapeDescriptor>, ahash::RandomState>,
    generics: HashMap<TypeIdentity, GenericFactory, ahash::RandomState>,
}

impl DescriptorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a non-generic descriptor, keyed by its base identity.
    pub fn insert(&mut self, descriptor: ShapeDescriptor) -> &mut Self {
        self.descriptors
            .insert(descriptor.type_ref().base().clone(), Arc::new(descriptor));
        self
    }

    /// Adds a factory for `base<..>`. The factory must return a descriptor whose type ref is
    /// `base` applied to the given arguments.
    pub fn insert_generic<F>(&mut self, base: impl Into<TypeIdentity>, factory: F) -> &mut Self
    where
        F: Fn(&[TypeRef]) -> std::result::Result<Option<ShapeDescriptor>, ResolutionError>
            + Send
            + Sync
            + 'static,
    {
        self.generics.insert(base.into(), Arc::new(factory));
        self
    }

    pub fn len(&self) -> usize {
        self.descriptors.len() + self.generics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DescriptorProvider for DescriptorSet {
    fn resolve_descriptor(&self, ty: &TypeIdentity) -> DescriptorResult {
        Ok(self.descriptors.get(ty).cloned())
    }

    fn resolve_parametrized(&self, base: &TypeIdentity, args: &[TypeRef]) -> DescriptorResult {
        match self.generics.get(base) {
            Some(factory) => factory(args).map(|descriptor| descriptor.map(Arc::new)),
            None => Ok(None),
        }
    }
}

impl fmt::Debug for DescriptorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorSet")
            .field("descriptors", &self.descriptors.keys().collect::<Vec<_>>())
            .field("generics", &self.generics.keys().collect::<Vec<_>>())
            .finish()
    }
}

type Subclasses = HashSet<TypeIdentity, ahash::RandomState>;

/// Serializers registered explicitly, and the concrete types admissible for each open base.
#[derive(Debug, Clone, Default)]
pub struct RegistrationTable {
    serializers: HashMap<TypeRef, SharedSerializer, ahash::RandomState>,
    subclasses: HashMap<TypeIdentity, Subclasses, ahash::RandomState>,
}

impl RegistrationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A table holding a [`ScalarSerializer`] for every [`ScalarType`], under its scalar name.
    pub fn with_builtins() -> Self {
        let mut table = Self::new();
        for scalar in ScalarType::ALL {
            table.register(scalar.type_ref(), Arc::new(ScalarSerializer::new(scalar)));
        }
        table
    }

    /// Registers `serializer` for `ty`, replacing any previous registration.
    pub fn register(&mut self, ty: impl Into<TypeRef>, serializer: SharedSerializer) {
        self.serializers.insert(ty.into(), serializer);
    }

    /// Declares `concrete` as a type a polymorphic `base` field may hold.
    pub fn register_subclass(
        &mut self,
        base: impl Into<TypeIdentity>,
        concrete: impl Into<TypeIdentity>,
    ) {
        self.subclasses
            .entry(base.into())
            .or_default()
            .insert(concrete.into());
    }

    pub fn lookup(&self, ty: &TypeRef) -> Option<SharedSerializer> {
        self.serializers.get(ty).cloned()
    }

    pub fn is_subclass(&self, base: &TypeIdentity, concrete: &TypeIdentity) -> bool {
        self.subclasses
            .get(base)
            .is_some_and(|concretes| concretes.contains(concrete))
    }

    /// Concrete types registered for `base`, in no particular order.
    pub fn subclasses(&self, base: &TypeIdentity) -> impl Iterator<Item = &TypeIdentity> {
        self.subclasses.get(base).into_iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.serializers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.serializers.is_empty()
    }
}

/// Resolved serializers for non-generic types, kept for the life of the registry.
#[derive(Debug)]
pub struct SerializerCache {
    cache: ResolutionCache<TypeIdentity>,
}

impl SerializerCache {
    fn new() -> Self {
        Self {
            cache: ResolutionCache::new(),
        }
    }

    pub fn state(&self, ty: &TypeIdentity) -> ResolutionState {
        self.cache.state(ty)
    }

    /// Number of types whose resolution finished, absences included.
    pub fn resolved_count(&self) -> usize {
        self.cache.resolved_count()
    }
}

/// Resolves types to serializers and encodes or decodes values of registered types.
///
/// The registry is `Send + Sync`; share it behind an `Arc` or a `static`. Resolution of one
/// type runs at most once at a time, and every caller observes the same serializer instance.
pub struct SerializerRegistry {
    table: RegistrationTable,
    provider: Option<Arc<dyn DescriptorProvider>>,
    cache: SerializerCache,
    parametrized: ParametrizedSerializerCache,
    config: CodecConfig,
}

impl Default for SerializerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SerializerRegistry {
    /// A registry with only the built-in scalar serializers.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn table(&self) -> &RegistrationTable {
        &self.table
    }

    pub fn cache(&self) -> &SerializerCache {
        &self.cache
    }

    pub fn parametrized_cache(&self) -> &ParametrizedSerializerCache {
        &self.parametrized
    }

    /// Resolves a non-generic type.
    ///
    /// `Ok(None)` means no source knows the type; that outcome is cached like a serializer.
    ///
    /// # Errors
    /// Returns the provider's error, or `MalformedDescriptor` if the provider answers with a
    /// descriptor for a different type. Errors are not cached.
    pub fn get(&self, ty: &TypeIdentity) -> Resolution {
        self.cache.cache.get_or_resolve(ty, || {
            let type_ref = TypeRef::new(ty.clone());
            if let Some(serializer) = self.table.lookup(&type_ref) {
                tracing::debug!(ty = %ty, source = "registration table", "resolved serializer");
                return Ok(Some(serializer));
            }
            let Some(provider) = &self.provider else {
                tracing::debug!(ty = %ty, "no serializer source knows type");
                return Ok(None);
            };
            let descriptor = provider.resolve_descriptor(ty).map_err(|error| {
                tracing::warn!(ty = %ty, error = %error, "descriptor provider failed");
                error
            })?;
            match descriptor {
                Some(descriptor) => {
                    tracing::debug!(
                        ty = %ty,
                        source = "descriptor provider",
                        "resolved serializer"
                    );
                    message_serializer(&type_ref, descriptor).map(Some)
                }
                None => {
                    tracing::debug!(ty = %ty, "no serializer source knows type");
                    Ok(None)
                }
            }
        })
    }

    /// Resolves `base<args>` through the [`ParametrizedSerializerCache`].
    ///
    /// Every type argument must itself resolve to a serializer; an argument no source knows
    /// fails the whole type instead of being cached as absence.
    ///
    /// # Errors
    /// Any failure is reported as `ResolutionError::Parametrized`.
    pub fn get_parametrized(
        &self,
        base: &TypeIdentity,
        args: &[TypeRef],
    ) -> Resolution {
        self.parametrized.get(base, args, || {
            let type_ref = TypeRef::parametrized(base.clone(), args.iter().cloned());
            for arg in args {
                if self.resolve(arg)?.is_none() {
                    return Err(ResolutionError::Parametrized {
                        key: type_ref.to_string(),
                        reason: format!("type argument {} has no serializer", arg),
                    });
                }
            }
            if let Some(serializer) = self.table.lookup(&type_ref) {
                return Ok(Some(serializer));
            }
            let Some(provider) = &self.provider else {
                return Ok(None);
            };
            provider
                .resolve_parametrized(base, args)?
                .map(|descriptor| message_serializer(&type_ref, descriptor))
                .transpose()
        })
    }

    /// Resolves any type reference, generic or not.
    pub fn resolve(&self, ty: &TypeRef) -> Resolution {
        if ty.is_parametrized() {
            self.get_parametrized(ty.base(), ty.args())
        } else {
            self.get(ty.base())
        }
    }

    /// Like [`resolve`](Self::resolve), for callers that cannot proceed without a serializer.
    ///
    /// # Errors
    /// Returns `SerializerNotFound` if no source knows `ty`.
    pub fn require(&self, ty: &TypeRef) -> Result<SharedSerializer> {
        self.resolve(ty)?
            .ok_or_else(|| EncoderError::SerializerNotFound(ty.clone()))
    }

    /// Resolves the concrete serializer a polymorphic `base` value names.
    ///
    /// # Errors
    /// Returns `UnknownPolymorphicType` if `name` was not registered as a subclass of `base` or
    /// has no serializer.
    pub fn resolve_subclass(&self, base: &TypeIdentity, name: &str) -> Result<SharedSerializer> {
        let concrete = TypeIdentity::new(name);
        if !self.table.is_subclass(base, &concrete) {
            tracing::debug!(
                base = %base,
                concrete = name,
                "discriminator is not a registered subclass"
            );
            return Err(EncoderError::UnknownPolymorphicType(name.to_string()));
        }
        self.get(&concrete)?
            .ok_or_else(|| EncoderError::UnknownPolymorphicType(name.to_string()))
    }

    /// Where `ty` stands in its resolution lifecycle.
    pub fn state(&self, ty: &TypeRef) -> ResolutionState {
        if ty.is_parametrized() {
            self.parametrized.state(&ParametrizedKey::from(ty))
        } else {
            self.cache.state(ty.base())
        }
    }

    /// Encodes `value` as a top-level `ty`.
    ///
    /// Messages are written as a bare body with no length prefix; unit encodes to nothing.
    pub fn encode(&self, ty: &TypeRef, value: &Value) -> Result<Bytes> {
        let serializer = self.require(ty)?;
        let mut writer = WireWriter::new();
        serializer.encode_root(value, &mut writer, &mut Context::new(self))?;
        Ok(writer.into_bytes())
    }

    /// Decodes a top-level `ty` occupying all of `bytes`.
    ///
    /// # Errors
    /// Returns `MalformedWireData` if bytes remain after a non-message value.
    pub fn decode(&self, ty: &TypeRef, bytes: Bytes) -> Result<Value> {
        let serializer = self.require(ty)?;
        let mut reader = WireReader::new(bytes);
        let value = serializer.decode_root(&mut reader, &mut Context::new(self))?;
        if !reader.is_empty() {
            return Err(EncoderError::MalformedWireData(format!(
                "{} trailing bytes after {}",
                reader.remaining(),
                ty
            )));
        }
        Ok(value)
    }
}

impl fmt::Debug for SerializerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializerRegistry")
            .field("table", &self.table.len())
            .field("provider", &self.provider.is_some())
            .field("cache", &self.cache)
            .field("parametrized", &self.parametrized)
            .field("config", &self.config)
            .finish()
    }
}

fn message_serializer(
    expected: &TypeRef,
    descriptor: Arc<ShapeDescriptor>,
) -> std::result::Result<SharedSerializer, ResolutionError> {
    if descriptor.type_ref() != expected {
        return Err(ResolutionError::MalformedDescriptor {
            type_name: expected.to_string(),
            reason: format!("provider returned the descriptor of {}", descriptor.type_ref()),
        });
    }
    Ok(Arc::new(MessageSerializer::new(descriptor)))
}

/// Setup-time construction of a [`SerializerRegistry`].
///
/// # Example
/// ```rust
/// use senax_protobuf::{
///     CodecConfig, FieldKind, ScalarType, SerializerRegistry, ShapeDescriptor, TypeRef,
/// };
///
/// let circle = ShapeDescriptor::builder("shapes.Circle")
///     .field(1, "radius", FieldKind::Primitive(ScalarType::Double))
///     .build()
///     .unwrap();
/// let registry = SerializerRegistry::builder()
///     .register_subclass_descriptor("shapes.Shape", circle)
///     .config(CodecConfig::default().with_encode_defaults(true))
///     .build();
///
/// assert!(registry.table().is_subclass(&"shapes.Shape".into(), &"shapes.Circle".into()));
/// assert!(registry.get(&"shapes.Circle".into()).unwrap().is_some());
/// ```
pub struct RegistryBuilder {
    table: RegistrationTable,
    provider: Option<Arc<dyn DescriptorProvider>>,
    config: CodecConfig,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self {
            table: RegistrationTable::with_builtins(),
            provider: None,
            config: CodecConfig::default(),
        }
    }

    pub fn register(mut self, ty: impl Into<TypeRef>, serializer: SharedSerializer) -> Self {
        self.table.register(ty, serializer);
        self
    }

    /// Registers a message type described by `descriptor`.
    pub fn register_descriptor(self, descriptor: ShapeDescriptor) -> Self {
        let serializer = MessageSerializer::new(Arc::new(descriptor));
        let ty = serializer.type_ref().clone();
        self.register(ty, Arc::new(serializer))
    }

    /// Registers `serializer` and admits its type as a concrete subclass of `base`.
    pub fn register_subclass(
        mut self,
        base: impl Into<TypeIdentity>,
        serializer: SharedSerializer,
    ) -> Self {
        let ty = serializer.type_ref().clone();
        self.table.register_subclass(base, ty.base().clone());
        self.register(ty, serializer)
    }

    /// Admits `concrete` as a subclass of `base` without registering a serializer; the
    /// serializer is resolved through the usual sources when a value names it.
    pub fn declare_subclass(
        mut self,
        base: impl Into<TypeIdentity>,
        concrete: impl Into<TypeIdentity>,
    ) -> Self {
        self.table.register_subclass(base, concrete);
        self
    }

    pub fn register_subclass_descriptor(
        self,
        base: impl Into<TypeIdentity>,
        descriptor: ShapeDescriptor,
    ) -> Self {
        self.register_subclass(base, Arc::new(MessageSerializer::new(Arc::new(descriptor))))
    }

    /// Fallback consulted for types the table does not hold.
    pub fn descriptor_provider(mut self, provider: impl DescriptorProvider + 'static) -> Self {
        self.provider = Some(Arc::new(provider));
        self
    }

    pub fn config(mut self, config: CodecConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> SerializerRegistry {
        SerializerRegistry {
            table: self.table,
            provider: self.provider,
            cache: SerializerCache::new(),
            parametrized: ParametrizedSerializerCache::new(),
            config: self.config,
        }
    }
}

impl fmt::Debug for RegistryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryBuilder")
            .field("table", &self.table.len())
            .field("provider", &self.provider.is_some())
            .field("config", &self.config)
            .finish()
    }
}
