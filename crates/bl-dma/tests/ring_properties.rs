//! Randomized ring construction checks

use bl_dma::{
    CommandKind, ContiguousMapper, DESCRIPTOR_SIZE, Direction, PagedMapper, PhysicalMapper,
    RingProgram, TransferBlock,
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

const PAGE: usize = 4096;

fn random_geometry(rng: &mut ChaCha8Rng) -> (usize, usize) {
    let block_count = rng.random_range(2..=600);
    // Power-of-two sizes never straddle pages, so scattered buffers are valid
    let block_size = 1usize << rng.random_range(4..=12);
    (block_count, block_size)
}

fn follow(ring: &RingProgram, steps: usize) -> usize {
    let mut index = 0;
    for _ in 0..steps {
        index = ring.successor(index).expect("every block has a successor");
    }
    index
}

#[test]
fn test_cycle_closes_for_random_geometry() {
    let mut rng = ChaCha8Rng::seed_from_u64(0xB0A5);

    for _ in 0..200 {
        let (count, size) = random_geometry(&mut rng);
        let mapper = ContiguousMapper::new(0x10_0000, count * size, PAGE);
        let ring = RingProgram::build(Direction::Output, &mapper, 0x2000, size, count).unwrap();

        assert_eq!(follow(&ring, count), 0, "N={count} size={size}");
        // No shorter cycle back to the origin
        for steps in 1..count.min(8) {
            assert_ne!(follow(&ring, steps), 0);
        }
        assert_eq!(ring.interrupt_count(), 1);
        assert!(ring.block(count - 1).unwrap().interrupt_enabled());
    }
}

#[test]
fn test_scattered_pages_resolved_per_page() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);

    for _ in 0..100 {
        let (count, size) = random_geometry(&mut rng);
        let pages = (count * size).div_ceil(PAGE);
        let mapper = PagedMapper::scattered(0x4000_0000, pages, PAGE);
        let ring = RingProgram::build(Direction::Input, &mapper, 0, size, count).unwrap();

        for i in 0..count {
            let block = ring.block(i).unwrap();
            assert_eq!(block.address, mapper.physical_address(i * size).unwrap());
            assert_eq!(block.req_count as usize, size);
            assert_eq!(block.kind, CommandKind::InputMore);
        }
    }
}

#[test]
fn test_encoded_list_decodes_back() {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let (count, size) = random_geometry(&mut rng);
    let mapper = ContiguousMapper::new(0, count * size, PAGE);
    let ring = RingProgram::build(Direction::Output, &mapper, 0x100, size, count).unwrap();

    let bytes = ring.encode();
    assert_eq!(bytes.len(), (count + 1) * DESCRIPTOR_SIZE);

    let decoded: Vec<TransferBlock> = bytes
        .chunks_exact(DESCRIPTOR_SIZE)
        .map(|chunk| TransferBlock::decode(chunk.try_into().unwrap()).unwrap())
        .collect();
    assert_eq!(decoded.as_slice(), ring.descriptors());
}

#[test]
fn test_hole_anywhere_aborts_build() {
    let mut rng = ChaCha8Rng::seed_from_u64(99);

    for _ in 0..50 {
        let count = rng.random_range(8..=64);
        let size: usize = 1024;
        let pages = (count * size).div_ceil(PAGE);
        let mut mapper = PagedMapper::scattered(0x4000_0000, pages, PAGE);
        let hole = rng.random_range(0..pages);
        mapper.unmap(hole);

        assert!(RingProgram::build(Direction::Output, &mapper, 0, size, count).is_err());
    }
}
