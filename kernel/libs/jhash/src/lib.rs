// SPDX-License-Identifier: MPL-2.0

//! Hash functions developed by Bob Jenkins.
//!
//! For further information, visit: www.burtleburtle.net/bob/hash/doobs.html
//!
//! Two members of the family are provided:
//!
//! - the *one-at-a-time* hash, which can be fed incrementally with
//!   [`jenkins_update`] and closed with [`jenkins_finish`], or driven through
//!   [`JenkinsHasher`] as a [`core::hash::Hasher`];
//! - the Linux kernel's flavor of the *lookup* hash ([`jhash_slice`]), which
//!   digests twelve bytes per round and is used for larger opaque blobs.
//!

#![no_std]
#![deny(unsafe_code)]

use core::hash::Hasher;

/// Feeds `bytes` into a running one-at-a-time hash.
///
/// Start with `0` (or any previous output of this function) and finish the
/// hash with [`jenkins_finish`]. Feeding a buffer in several pieces yields the
/// same value as feeding it at once.
pub const fn jenkins_update(bytes: &[u8], mut hash: u32) -> u32 {
    let mut index = 0;
    while index < bytes.len() {
        hash = hash.wrapping_add(bytes[index] as u32);
        hash = hash.wrapping_add(hash << 10);
        hash ^= hash >> 6;
        index += 1;
    }
    hash
}

/// Performs the final avalanche of a one-at-a-time hash.
pub const fn jenkins_finish(mut hash: u32) -> u32 {
    hash = hash.wrapping_add(hash << 3);
    hash ^= hash >> 11;
    hash.wrapping_add(hash << 15)
}

/// A [`Hasher`] computing the one-at-a-time hash of everything written to it.
///
/// Integers are fed in little-endian order so that the result does not depend
/// on the machine.
#[derive(Debug, Default, Clone, Copy)]
pub struct JenkinsHasher {
    state: u32,
}

impl JenkinsHasher {
    /// Creates a hasher whose running state starts at `seed`.
    pub const fn with_seed(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Returns the finished 32-bit hash.
    pub const fn finish_u32(&self) -> u32 {
        jenkins_finish(self.state)
    }
}

impl Hasher for JenkinsHasher {
    fn finish(&self) -> u64 {
        self.finish_u32() as u64
    }

    fn write(&mut self, bytes: &[u8]) {
        self.state = jenkins_update(bytes, self.state);
    }

    fn write_u16(&mut self, i: u16) {
        self.write(&i.to_le_bytes());
    }

    fn write_u32(&mut self, i: u32) {
        self.write(&i.to_le_bytes());
    }

    fn write_u64(&mut self, i: u64) {
        self.write(&i.to_le_bytes());
    }

    fn write_usize(&mut self, i: usize) {
        self.write_u64(i as u64);
    }
}

/// A randomly chosen initial value
const JHASH_INITVAL: u32 = 0xdeadbeef;

/// Hashes an arbitrary u8 slice with the lookup hash.
///
/// Several slices can be chained by passing the previous result as `initval`.
pub const fn jhash_slice(slice: &[u8], initval: u32) -> u32 {
    let mut length = slice.len();
    let mut index: usize = 0;

    let mut a: u32 = JHASH_INITVAL
        .wrapping_add(length as u32)
        .wrapping_add(initval);
    let mut b: u32 = a;
    let mut c: u32 = a;

    while length > 12 {
        // FIXME: The Linux version uses `u32::from_ne_bytes`.
        // Little-endian keeps the result identical on all machines.
        a = a.wrapping_add(read_le_u32(slice, index));
        b = b.wrapping_add(read_le_u32(slice, index + 4));
        c = c.wrapping_add(read_le_u32(slice, index + 8));
        (a, b, c) = jhash_mix(a, b, c);

        index += 12;
        length -= 12;
    }

    if length == 0 {
        return c;
    }

    // The last 1..=12 bytes, zero-padded into three little-endian words.
    let mut tail = [0u32; 3];
    let mut i = 0;
    while i < length {
        tail[i / 4] |= (slice[index + i] as u32) << ((i % 4) * 8);
        i += 1;
    }

    jhash_final(
        a.wrapping_add(tail[0]),
        b.wrapping_add(tail[1]),
        c.wrapping_add(tail[2]),
    )
}

const fn read_le_u32(slice: &[u8], index: usize) -> u32 {
    u32::from_le_bytes([
        slice[index],
        slice[index + 1],
        slice[index + 2],
        slice[index + 3],
    ])
}

/// Finalizes the mix of three 32-bit values into a single u32 value
const fn jhash_final(mut a: u32, mut b: u32, mut c: u32) -> u32 {
    c ^= b;
    c = c.wrapping_sub(b.rotate_left(14));

    a ^= c;
    a = a.wrapping_sub(c.rotate_left(11));

    b ^= a;
    b = b.wrapping_sub(a.rotate_left(25));

    c ^= b;
    c = c.wrapping_sub(b.rotate_left(16));

    a ^= c;
    a = a.wrapping_sub(c.rotate_left(4));

    b ^= a;
    b = b.wrapping_sub(a.rotate_left(14));

    c ^= b;
    c.wrapping_sub(b.rotate_left(24))
}

/// Mixes three 32-bit values in a reversible manner
const fn jhash_mix(mut a: u32, mut b: u32, mut c: u32) -> (u32, u32, u32) {
    a = a.wrapping_sub(c);
    a ^= c.rotate_left(4);
    c = c.wrapping_add(b);

    b = b.wrapping_sub(a);
    b ^= a.rotate_left(6);
    a = a.wrapping_add(c);

    c = c.wrapping_sub(b);
    c ^= b.rotate_left(8);
    b = b.wrapping_add(a);

    a = a.wrapping_sub(c);
    a ^= c.rotate_left(16);
    c = c.wrapping_add(b);

    b = b.wrapping_sub(a);
    b ^= a.rotate_left(19);
    a = a.wrapping_add(c);

    c = c.wrapping_sub(b);
    c ^= b.rotate_left(4);
    b = b.wrapping_add(a);

    (a, b, c)
}
