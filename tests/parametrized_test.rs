use senax_protobuf::{
    DescriptorSet, EncoderError, FieldKind, Message, ParametrizedKey,
    ParametrizedSerializerCache, ResolutionError, ResolutionState, ScalarSerializer, ScalarType,
    SerializerRegistry, ShapeDescriptor, SharedSerializer, TypeIdentity, TypeRef, Value,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

fn scalar(scalar: ScalarType) -> TypeRef {
    scalar.type_ref()
}

fn field_kind(arg: &TypeRef) -> FieldKind {
    match ScalarType::from_name(arg.base().name()) {
        Some(scalar) if !arg.is_parametrized() => FieldKind::Primitive(scalar),
        _ => FieldKind::Nested(arg.clone()),
    }
}

type PairResult = Result<Option<ShapeDescriptor>, ResolutionError>;

/// `std.Pair<A, B>`: `{ 1: first A, 2: second B }`.
fn pair_descriptor(args: &[TypeRef]) -> PairResult {
    let [first, second] = args else {
        return Err(ResolutionError::MalformedDescriptor {
            type_name: "std.Pair".to_string(),
            reason: format!("expected 2 type arguments, got {}", args.len()),
        });
    };
    ShapeDescriptor::builder(TypeRef::parametrized("std.Pair", args.iter().cloned()))
        .field(1, "first", field_kind(first))
        .field(2, "second", field_kind(second))
        .build()
        .map(Some)
}

fn pair_registry(calls: &Arc<AtomicUsize>) -> SerializerRegistry {
    let calls = Arc::clone(calls);
    let mut set = DescriptorSet::new();
    set.insert(
        ShapeDescriptor::builder("test.Point")
            .field(1, "x", FieldKind::Primitive(ScalarType::SInt32))
            .field(2, "y", FieldKind::Primitive(ScalarType::SInt32))
            .build()
            .unwrap(),
    );
    set.insert_generic("std.Pair", move |args: &[TypeRef]| {
        calls.fetch_add(1, Ordering::SeqCst);
        pair_descriptor(args)
    });
    set.insert_generic("std.Broken", |_: &[TypeRef]| -> PairResult {
        panic!("generic factory exploded")
    });
    SerializerRegistry::builder().descriptor_provider(set).build()
}

#[test]
fn test_key_equality_depends_on_argument_order() {
    let base = TypeIdentity::new("std.Map");
    let forward = ParametrizedKey::new(
        base.clone(),
        vec![scalar(ScalarType::Int32), scalar(ScalarType::String)],
    );
    let reverse = ParametrizedKey::new(
        base.clone(),
        vec![scalar(ScalarType::String), scalar(ScalarType::Int32)],
    );
    assert_ne!(forward, reverse);
    assert_eq!(
        forward,
        ParametrizedKey::new(
            base,
            vec![scalar(ScalarType::Int32), scalar(ScalarType::String)]
        )
    );
    assert_eq!(forward.to_string(), "std.Map<int32, string>");
    assert_eq!(reverse.to_string(), "std.Map<string, int32>");
}

#[test]
fn test_argument_order_yields_distinct_serializers() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = pair_registry(&calls);
    let base = TypeIdentity::new("std.Pair");
    let forward = [scalar(ScalarType::Int32), scalar(ScalarType::String)];
    let reverse = [scalar(ScalarType::String), scalar(ScalarType::Int32)];

    let a = registry.get_parametrized(&base, &forward).unwrap().unwrap();
    let b = registry.get_parametrized(&base, &reverse).unwrap().unwrap();
    let a_again = registry.get_parametrized(&base, &forward).unwrap().unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(&a, &a_again));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(registry.parametrized_cache().resolved_count(), 2);
}

#[test]
fn test_generic_round_trip() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = pair_registry(&calls);
    let ty = TypeRef::parametrized(
        "std.Pair",
        [scalar(ScalarType::Int32), scalar(ScalarType::String)],
    );
    let value = Value::Message(Message::new(ty.clone()).with(1, 150i32).with(2, "id"));

    let bytes = registry.encode(&ty, &value).unwrap();
    assert_eq!(&bytes[..], &[0x08, 0x96, 0x01, 0x12, 0x02, b'i', b'd']);
    assert_eq!(registry.decode(&ty, bytes).unwrap(), value);
    assert_eq!(registry.state(&ty), ResolutionState::Cached);
}

#[test]
fn test_nested_generic_arguments() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = pair_registry(&calls);
    let inner = TypeRef::parametrized(
        "std.Pair",
        [TypeRef::new("test.Point"), scalar(ScalarType::Bool)],
    );
    let outer = TypeRef::parametrized("std.Pair", [inner.clone(), scalar(ScalarType::Double)]);

    let point = Message::new("test.Point").with(1, -4i32).with(2, 9i32);
    let value = Value::Message(
        Message::new(outer.clone())
            .with(1, Message::new(inner).with(1, point).with(2, true))
            .with(2, 0.25f64),
    );
    let bytes = registry.encode(&outer, &value).unwrap();
    assert_eq!(registry.decode(&outer, bytes).unwrap(), value);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_factory_error_is_wrapped_and_not_cached() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = pair_registry(&calls);
    let base = TypeIdentity::new("std.Pair");
    let args = [scalar(ScalarType::Int32)];

    for attempt in 1..=2 {
        match registry.get_parametrized(&base, &args) {
            Err(ResolutionError::Parametrized { key, reason }) => {
                assert_eq!(key, "std.Pair<int32>");
                assert!(reason.contains("expected 2 type arguments"), "{}", reason);
            }
            other => panic!("expected Parametrized error, got {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), attempt);
    }
    assert_eq!(
        registry.state(&TypeRef::parametrized("std.Pair", args.iter().cloned())),
        ResolutionState::Unresolved
    );
}

#[test]
fn test_factory_panic_is_captured() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = pair_registry(&calls);
    let ty = TypeRef::parametrized("std.Broken", [scalar(ScalarType::Int32)]);

    match registry.resolve(&ty) {
        Err(ResolutionError::Parametrized { reason, .. }) => {
            assert!(reason.contains("generic factory exploded"), "{}", reason);
        }
        other => panic!("expected Parametrized error, got {:?}", other),
    }
    // The registry stays usable.
    let value = Value::Message(Message::new(ty.clone()));
    assert!(matches!(
        registry.encode(&ty, &value),
        Err(EncoderError::Resolution(ResolutionError::Parametrized { .. }))
    ));
    let pair = TypeRef::parametrized(
        "std.Pair",
        [scalar(ScalarType::Bool), scalar(ScalarType::Bool)],
    );
    assert!(registry.resolve(&pair).unwrap().is_some());
}

#[test]
fn test_unresolvable_type_argument_fails_resolution() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = pair_registry(&calls);
    let ty = TypeRef::parametrized(
        "std.Pair",
        [scalar(ScalarType::Int32), TypeRef::new("no.Such")],
    );

    for _ in 0..2 {
        match registry.resolve(&ty) {
            Err(ResolutionError::Parametrized { key, reason }) => {
                assert_eq!(key, "std.Pair<int32, no.Such>");
                assert!(reason.contains("no.Such"), "{}", reason);
            }
            other => panic!("expected Parametrized error, got {:?}", other),
        }
        assert_eq!(registry.state(&ty), ResolutionState::Unresolved);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(matches!(
        registry.encode(&ty, &Value::Message(Message::new(ty.clone()))),
        Err(EncoderError::Resolution(ResolutionError::Parametrized { .. }))
    ));

    // A failing argument nested one level down fails the outer type as well.
    let outer = TypeRef::parametrized("std.Pair", [ty.clone(), scalar(ScalarType::Bool)]);
    assert!(matches!(
        registry.resolve(&outer),
        Err(ResolutionError::Parametrized { .. })
    ));
    assert_eq!(registry.state(&outer), ResolutionState::Unresolved);
}

#[test]
fn test_unknown_generic_is_cached_absent() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = pair_registry(&calls);
    let ty = TypeRef::parametrized("std.Unknown", [scalar(ScalarType::Int32)]);

    assert!(registry.resolve(&ty).unwrap().is_none());
    assert_eq!(registry.state(&ty), ResolutionState::CachedAbsent);
    assert!(matches!(
        registry.require(&ty),
        Err(EncoderError::SerializerNotFound(_))
    ));
}

#[test]
fn test_registered_generic_instance_needs_no_provider() {
    let ty = TypeRef::parametrized(
        "std.Pair",
        [scalar(ScalarType::String), scalar(ScalarType::UInt32)],
    );
    let descriptor = pair_descriptor(ty.args()).unwrap().unwrap();
    let registry = SerializerRegistry::builder()
        .register_descriptor(descriptor)
        .build();

    let value = Value::Message(Message::new(ty.clone()).with(1, "k").with(2, 7u32));
    let bytes = registry.encode(&ty, &value).unwrap();
    assert_eq!(registry.decode(&ty, bytes).unwrap(), value);
}

#[test]
fn test_cache_direct_use() {
    let cache = ParametrizedSerializerCache::new();
    let base = TypeIdentity::new("std.Box");
    let args = [scalar(ScalarType::Int64)];

    let failed = cache.get(&base, &args, || panic!("boom"));
    match failed {
        Err(ResolutionError::Parametrized { key, reason }) => {
            assert_eq!(key, "std.Box<int64>");
            assert!(reason.contains("boom"), "{}", reason);
        }
        other => panic!("expected Parametrized error, got {:?}", other),
    }

    let serializer: SharedSerializer = Arc::new(ScalarSerializer::new(ScalarType::Int64));
    let resolved = cache
        .get(&base, &args, || Ok(Some(Arc::clone(&serializer))))
        .unwrap()
        .unwrap();
    assert!(Arc::ptr_eq(&resolved, &serializer));

    // Later factories are not consulted once a result is cached.
    let cached = cache
        .get(&base, &args, || panic!("must not run"))
        .unwrap()
        .unwrap();
    assert!(Arc::ptr_eq(&cached, &serializer));
    assert_eq!(
        cache.state(&ParametrizedKey::new(base, args.to_vec())),
        ResolutionState::Cached
    );
}

#[test]
fn test_concurrent_parametrized_resolution() {
    const THREADS: usize = 6;
    let cache = Arc::new(ParametrizedSerializerCache::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                cache
                    .get(
                        &TypeIdentity::new("std.List"),
                        &[scalar(ScalarType::String)],
                        || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(20));
                            let serializer: SharedSerializer =
                                Arc::new(ScalarSerializer::new(ScalarType::String));
                            Ok(Some(serializer))
                        },
                    )
                    .unwrap()
                    .unwrap()
            })
        })
        .collect();
    let serializers: Vec<SharedSerializer> =
        handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(serializers
        .windows(2)
        .all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
