//! Integration tests: every element type survives encode → decode → typed
//! read, at the boundary counts 0, 1 and the largest count that fits.

use rovecomm_core::protocol::{HEADER_SIZE, MAX_PAYLOAD_SIZE};
use rovecomm_core::{decode_packet, encode_packet, Element, ElementType, FrameAccumulator, Packet};

fn max_count(ty: ElementType) -> usize {
    MAX_PAYLOAD_SIZE / ty.width()
}

fn assert_round_trip<T>(ty: ElementType, sample: T)
where
    T: Element + PartialEq + std::fmt::Debug,
{
    for count in [0, 1, max_count(ty)] {
        // Arrange
        let values = vec![sample; count];
        let packet = Packet::new(4242, ty, &values).expect("build");

        // Act
        let bytes = encode_packet(&packet);
        let decoded = decode_packet(&bytes).expect("decode");

        // Assert
        assert_eq!(bytes.len(), HEADER_SIZE + count * ty.width(), "{ty:?} x{count}");
        assert_eq!(decoded.element_type(), ty);
        assert_eq!(decoded.element_count() as usize, count);
        assert_eq!(decoded.elements::<T>().expect("typed read"), values);
    }
}

#[test]
fn test_int8_round_trip() {
    assert_round_trip(ElementType::Int8, -128i8);
}

#[test]
fn test_uint8_round_trip() {
    assert_round_trip(ElementType::UInt8, 255u8);
}

#[test]
fn test_int16_round_trip() {
    assert_round_trip(ElementType::Int16, -12345i16);
}

#[test]
fn test_uint16_round_trip() {
    assert_round_trip(ElementType::UInt16, 0xBEEFu16);
}

#[test]
fn test_int32_round_trip() {
    assert_round_trip(ElementType::Int32, -1_000_000i32);
}

#[test]
fn test_uint32_round_trip() {
    assert_round_trip(ElementType::UInt32, 0xDEAD_BEEFu32);
}

#[test]
fn test_float32_round_trip() {
    assert_round_trip(ElementType::Float32, -48.75f32);
}

#[test]
fn test_float64_round_trip() {
    assert_round_trip(ElementType::Float64, 1234.5678f64);
}

#[test]
fn test_char_round_trip() {
    assert_round_trip(ElementType::Char, b'R');
}

#[test]
fn test_wire_bytes_for_id_1100() {
    let packet = Packet::new(1100, ElementType::UInt8, &[1u8]).unwrap();

    assert_eq!(
        encode_packet(&packet),
        vec![0x03, 0x04, 0x4C, 0x00, 0x01, 0x01, 0x01]
    );
}

#[test]
fn test_float_wire_bytes_are_big_endian() {
    let packet = Packet::new(2100, ElementType::Float64, &[1.0f64]).unwrap();

    let bytes = encode_packet(&packet);

    assert_eq!(&bytes[HEADER_SIZE..], &[0x3F, 0xF0, 0, 0, 0, 0, 0, 0]);
}

#[test]
fn test_stream_of_many_frames_byte_by_byte() {
    // Arrange
    let packets: Vec<Packet> = (0..5u16)
        .map(|i| Packet::new(3000 + i, ElementType::Int16, &vec![i as i16; i as usize]).unwrap())
        .collect();
    let stream: Vec<u8> = packets.iter().flat_map(encode_packet).collect();
    let mut acc = FrameAccumulator::new();
    let mut received = Vec::new();

    // Act
    for byte in stream {
        acc.push(&[byte]);
        while let Some(p) = acc.next_frame().expect("valid stream") {
            received.push(p);
        }
    }

    // Assert
    assert_eq!(received, packets);
    assert!(acc.is_empty());
}
