//! Serializer cache for generic types.

use crate::cache::{ResolutionCache, ResolutionState};
use crate::descriptor::{TypeIdentity, TypeRef};
use crate::serializer::SharedSerializer;
use crate::ResolutionError;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// Cache key for a generic type: the base identity and its type arguments, in order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParametrizedKey {
    base: TypeIdentity,
    args: Vec<TypeRef>,
}

impl ParametrizedKey {
    pub fn new(base: TypeIdentity, args: Vec<TypeRef>) -> Self {
        Self { base, args }
    }

    pub fn base(&self) -> &TypeIdentity {
        &self.base
    }

    pub fn args(&self) -> &[TypeRef] {
        &self.args
    }
}

impl fmt::Display for ParametrizedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&TypeRef::parametrized(self.base.clone(), self.args.iter().cloned()), f)
    }
}

impl From<&TypeRef> for ParametrizedKey {
    fn from(ty: &TypeRef) -> Self {
        Self::new(ty.base().clone(), ty.args().to_vec())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "factory panicked".to_string()
    }
}

/// Serializers for generic types, keyed by [`ParametrizedKey`].
///
/// The factory runs at most once per key at a time and only successful outcomes are kept.
/// Every failure, a factory panic included, comes back as [`ResolutionError::Parametrized`] and
/// leaves the key unresolved.
#[derive(Debug)]
pub struct ParametrizedSerializerCache {
    cache: ResolutionCache<ParametrizedKey>,
}

impl Default for ParametrizedSerializerCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ParametrizedSerializerCache {
    pub fn new() -> Self {
        Self {
            cache: ResolutionCache::new(),
        }
    }

    /// Returns the cached outcome for `base<args>`, running `factory` on a miss.
    ///
    /// # Errors
    /// Returns `ResolutionError::Parametrized` if the factory fails or panics.
    pub fn get<F>(
        &self,
        base: &TypeIdentity,
        args: &[TypeRef],
        factory: F,
    ) -> Result<Option<SharedSerializer>, ResolutionError>
    where
        F: FnOnce() -> Result<Option<SharedSerializer>, ResolutionError>,
    {
        let key = ParametrizedKey::new(base.clone(), args.to_vec());
        self.cache.get_or_resolve(&key, || {
            tracing::debug!(key = %key, "resolving parametrized serializer");
            let outcome = panic::catch_unwind(AssertUnwindSafe(factory));
            let error = match outcome {
                Ok(Ok(resolved)) => return Ok(resolved),
                Ok(Err(error @ ResolutionError::Parametrized { .. })) => error,
                Ok(Err(error)) => ResolutionError::Parametrized {
                    key: key.to_string(),
                    reason: error.to_string(),
                },
                Err(payload) => ResolutionError::Parametrized {
                    key: key.to_string(),
                    reason: format!("factory panicked: {}", panic_message(payload.as_ref())),
                },
            };
            tracing::warn!(key = %key, error = %error, "parametrized serializer resolution failed");
            Err(error)
        })
    }

    pub fn state(&self, key: &ParametrizedKey) -> ResolutionState {
        self.cache.state(key)
    }

    /// Number of keys whose resolution finished.
    pub fn resolved_count(&self) -> usize {
        self.cache.resolved_count()
    }
}
