#![cfg(not(target_arch = "wasm32"))]

use std::sync::Arc;

use proptest::prelude::*;
use psx_mem::{AddressSpace, PhysicalMemory, CACHE_CONTROL_ADDR, RAM_SIZE};

const SEGMENTS: [u32; 3] = [0x0000_0000, 0x8000_0000, 0xa000_0000];

fn bus() -> AddressSpace {
    AddressSpace::new(Arc::new(PhysicalMemory::new()))
}

fn ram_offset(width: u32) -> impl Strategy<Value = u32> {
    (0..(RAM_SIZE / width)).prop_map(move |i| i * width)
}

proptest! {
    #[test]
    fn word_roundtrip_through_any_mirror(
        offset in ram_offset(4),
        value in any::<u32>(),
        w in 0usize..3,
        r in 0usize..3,
    ) {
        let mut bus = bus();
        bus.write_u32(SEGMENTS[w] | offset, value);
        prop_assert_eq!(bus.read_u32(SEGMENTS[r] | offset), value);
    }

    #[test]
    fn half_roundtrip_through_any_mirror(
        offset in ram_offset(2),
        value in any::<u16>(),
        w in 0usize..3,
        r in 0usize..3,
    ) {
        let mut bus = bus();
        bus.write_u16(SEGMENTS[w] | offset, value);
        prop_assert_eq!(bus.read_u16(SEGMENTS[r] | offset), value);
    }

    #[test]
    fn byte_roundtrip_through_any_mirror(
        offset in ram_offset(1),
        value in any::<u8>(),
        w in 0usize..3,
        r in 0usize..3,
    ) {
        let mut bus = bus();
        bus.write_u8(SEGMENTS[w] | offset, value);
        prop_assert_eq!(bus.read_u8(SEGMENTS[r] | offset), value);
    }

    #[test]
    fn isolated_stores_never_land(
        offset in ram_offset(4),
        before in any::<u32>(),
        during in any::<u32>(),
        seg in 0usize..3,
    ) {
        let mut bus = bus();
        bus.write_u32(SEGMENTS[seg] | offset, before);
        bus.write_u32(CACHE_CONTROL_ADDR, 0x800);
        bus.write_u32(SEGMENTS[seg] | offset, during);
        prop_assert_eq!(bus.read_u32(SEGMENTS[seg] | offset), before);
        bus.write_u32(CACHE_CONTROL_ADDR, 0x0);
        prop_assert_eq!(bus.read_u32(offset), before);
    }
}
