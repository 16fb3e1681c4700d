pub use integer_sqrt::IntegerSquareRoot;

use types::primitives::H256;

// endianness is not configurable
pub fn int_to_bytes(int: u64, length: usize) -> Vec<u8> {
    let mut vec = int.to_le_bytes().to_vec();
    vec.resize(length, 0);
    vec
}

pub fn int_to_bytes_32(int: u32, length: usize) -> Vec<u8> {
    let mut vec = int.to_le_bytes().to_vec();
    vec.resize(length, 0);
    vec
}

pub fn bytes_to_int(bytes: [u8; 8]) -> u64 {
    u64::from_le_bytes(bytes)
}

pub fn xor(bytes_1: &H256, bytes_2: &H256) -> H256 {
    let mut result = H256::zero();
    for (position, byte) in result.as_bytes_mut().iter_mut().enumerate() {
        *byte = bytes_1[position] ^ bytes_2[position];
    }
    result
}
