use bytes::{Bytes, BytesMut};
use proptest::prelude::*;
use senax_protobuf::{
    decode, encode, Decoder, Encoder, EncoderError, Fixed32, Fixed64, SFixed32, SFixed64, SInt32,
    SInt64, WireType,
};

fn round_trip<T: Encoder + Decoder>(value: &T) -> T {
    let mut buffer = BytesMut::new();
    value.encode(&mut buffer).unwrap();
    let mut reader = buffer.freeze();
    let decoded = T::decode(&mut reader).unwrap();
    assert!(reader.is_empty(), "decode left {} bytes", reader.len());
    decoded
}

#[test]
fn test_golden_vectors() {
    assert_eq!(&encode(&true).unwrap()[..], &[0x01]);
    assert_eq!(&encode(&'c').unwrap()[..], &[0x63]);
    assert_eq!(&encode(&1i8).unwrap()[..], &[0x01]);
    assert_eq!(&encode(&1i16).unwrap()[..], &[0x01]);
    assert_eq!(&encode(&1i32).unwrap()[..], &[0x01]);
    assert_eq!(&encode(&1i64).unwrap()[..], &[0x01]);
    assert_eq!(&encode(&1.0f32).unwrap()[..], &[0x00, 0x00, 0x80, 0x3F]);
    assert_eq!(
        &encode(&1.0f64).unwrap()[..],
        &[0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xF0, 0x3F]
    );
    assert_eq!(&encode("string").unwrap()[..], b"\x06string");
    assert_eq!(&encode(&"string".to_string()).unwrap()[..], b"\x06string");
    assert!(encode(&()).unwrap().is_empty());
}

#[test]
fn test_wire_types() {
    assert_eq!(<bool as Encoder>::WIRE_TYPE, WireType::Varint);
    assert_eq!(<i64 as Encoder>::WIRE_TYPE, WireType::Varint);
    assert_eq!(<SInt32 as Encoder>::WIRE_TYPE, WireType::Varint);
    assert_eq!(<f32 as Encoder>::WIRE_TYPE, WireType::Fixed32);
    assert_eq!(<Fixed32 as Encoder>::WIRE_TYPE, WireType::Fixed32);
    assert_eq!(<f64 as Encoder>::WIRE_TYPE, WireType::Fixed64);
    assert_eq!(<SFixed64 as Encoder>::WIRE_TYPE, WireType::Fixed64);
    assert_eq!(<String as Encoder>::WIRE_TYPE, WireType::LengthDelimited);
    assert_eq!(<Bytes as Encoder>::WIRE_TYPE, WireType::LengthDelimited);
}

#[test]
fn test_negative_int32_takes_ten_bytes() {
    let encoded = encode(&-1i32).unwrap();
    assert_eq!(
        &encoded[..],
        &[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]
    );
    assert_eq!(round_trip(&-1i32), -1);
    assert_eq!(round_trip(&i32::MIN), i32::MIN);
    assert_eq!(round_trip(&i64::MIN), i64::MIN);
}

#[test]
fn test_zigzag_and_fixed_newtypes() {
    assert_eq!(&encode(&SInt32(0)).unwrap()[..], &[0x00]);
    assert_eq!(&encode(&SInt32(-1)).unwrap()[..], &[0x01]);
    assert_eq!(&encode(&SInt32(1)).unwrap()[..], &[0x02]);
    assert_eq!(&encode(&SInt64(-2)).unwrap()[..], &[0x03]);
    assert_eq!(&encode(&Fixed32(1)).unwrap()[..], &[0x01, 0x00, 0x00, 0x00]);
    assert_eq!(&encode(&SFixed32(-1)).unwrap()[..], &[0xFF; 4]);
    assert_eq!(&encode(&SFixed64(-1)).unwrap()[..], &[0xFF; 8]);

    assert_eq!(round_trip(&SInt32(i32::MIN)), SInt32(i32::MIN));
    assert_eq!(round_trip(&SInt64(i64::MAX)), SInt64(i64::MAX));
    assert_eq!(round_trip(&Fixed64(u64::MAX)), Fixed64(u64::MAX));
    assert_eq!(round_trip(&SFixed64(i64::MIN)), SFixed64(i64::MIN));
}

#[test]
fn test_float_bit_exact() {
    let negative_zero = round_trip(&-0.0f32);
    assert_eq!(negative_zero.to_bits(), (-0.0f32).to_bits());
    assert_ne!(negative_zero.to_bits(), 0.0f32.to_bits());

    let nan = f32::from_bits(0x7FC0_0001);
    assert_eq!(round_trip(&nan).to_bits(), 0x7FC0_0001);

    let nan64 = f64::from_bits(0xFFF8_0000_DEAD_BEEF);
    assert_eq!(round_trip(&nan64).to_bits(), 0xFFF8_0000_DEAD_BEEF);
    assert_eq!(round_trip(&-0.0f64).to_bits(), (-0.0f64).to_bits());
}

#[test]
fn test_negative_zero_is_not_default() {
    assert!(0.0f32.is_default());
    assert!(!(-0.0f32).is_default());
    assert!(0.0f64.is_default());
    assert!(!(-0.0f64).is_default());
}

#[test]
fn test_bool_accepts_any_nonzero_varint() {
    let mut reader = Bytes::from_static(&[0x02]);
    assert!(decode::<bool>(&mut reader).unwrap());
    let mut reader = Bytes::from_static(&[0x80, 0x01]);
    assert!(decode::<bool>(&mut reader).unwrap());
    let mut reader = Bytes::from_static(&[0x00]);
    assert!(!decode::<bool>(&mut reader).unwrap());
}

#[test]
fn test_char_round_trip() {
    for c in ['\0', 'c', 'é', '中', '🦀'] {
        assert_eq!(round_trip(&c), c);
    }
    let mut surrogate = encode(&0xD800u32).unwrap();
    assert!(matches!(
        decode::<char>(&mut surrogate),
        Err(EncoderError::MalformedWireData(_))
    ));
}

#[test]
fn test_narrow_integers_are_range_checked() {
    assert_eq!(round_trip(&-5i8), -5);
    assert_eq!(round_trip(&i16::MIN), i16::MIN);
    assert_eq!(round_trip(&u8::MAX), u8::MAX);

    let mut reader = encode(&300u32).unwrap();
    assert!(matches!(
        decode::<i8>(&mut reader),
        Err(EncoderError::MalformedWireData(_))
    ));
    let mut reader = encode(&70_000u32).unwrap();
    assert!(matches!(
        decode::<u16>(&mut reader),
        Err(EncoderError::MalformedWireData(_))
    ));
}

#[test]
fn test_32_bit_varints_truncate() {
    let mut reader = encode(&(u64::from(u32::MAX) + 2)).unwrap();
    assert_eq!(decode::<u32>(&mut reader).unwrap(), 1);
    // An int64 -1 read as int32 is still -1.
    let mut reader = encode(&-1i64).unwrap();
    assert_eq!(decode::<i32>(&mut reader).unwrap(), -1);
}

#[test]
fn test_string_truncated() {
    let mut reader = Bytes::from_static(b"\x06str");
    match decode::<String>(&mut reader) {
        Err(EncoderError::TruncatedInput { needed, remaining }) => {
            assert_eq!(needed, 6);
            assert_eq!(remaining, 3);
        }
        other => panic!("expected TruncatedInput, got {:?}", other),
    }
}

#[test]
fn test_string_invalid_utf8() {
    let mut reader = Bytes::from_static(&[0x02, 0xC3, 0x28]);
    assert!(matches!(
        decode::<String>(&mut reader),
        Err(EncoderError::MalformedWireData(_))
    ));
    let mut reader = Bytes::from_static(&[0x02, 0xC3, 0x28]);
    assert_eq!(&decode::<Bytes>(&mut reader).unwrap()[..], &[0xC3, 0x28]);
}

#[test]
fn test_fixed_truncated() {
    let mut reader = Bytes::from_static(&[0x00, 0x00, 0x80]);
    assert!(matches!(
        decode::<f32>(&mut reader),
        Err(EncoderError::TruncatedInput {
            needed: 4,
            remaining: 3
        })
    ));
}

#[test]
fn test_bytes_round_trip() {
    let payload = Bytes::from_static(&[0x00, 0xFF, 0x10]);
    assert_eq!(round_trip(&payload), payload);
    assert_eq!(round_trip(&vec![1u8, 2, 3]), vec![1u8, 2, 3]);
    assert_eq!(round_trip(&String::new()), "");
    assert_eq!(round_trip(&()), ());
}

proptest! {
    #[test]
    fn prop_f32_round_trip_is_bit_exact(bits in any::<u32>()) {
        let value = f32::from_bits(bits);
        prop_assert_eq!(round_trip(&value).to_bits(), bits);
    }

    #[test]
    fn prop_f64_round_trip_is_bit_exact(bits in any::<u64>()) {
        let value = f64::from_bits(bits);
        prop_assert_eq!(round_trip(&value).to_bits(), bits);
    }

    #[test]
    fn prop_i64_round_trip(value in any::<i64>()) {
        prop_assert_eq!(round_trip(&value), value);
        prop_assert_eq!(round_trip(&SInt64(value)), SInt64(value));
    }

    #[test]
    fn prop_string_round_trip(value in ".*") {
        prop_assert_eq!(round_trip(&value), value);
    }
}
