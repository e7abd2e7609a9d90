//! A 64-bit, CityHash-style, non-cryptographic hash.
//!
//! Inputs are split into length classes ("buckets") and each bucket has its
//! own mixing strategy.  Only the bucket for a given length ever reads from
//! the input, and every read it makes is in bounds for that length.
//!
//! All arithmetic is modulo 2^64.  Digests are stable across hosts: words
//! are always decoded little-endian.

pub const K0: u64 = 0xc3a5c85c97cb3127;
pub const K1: u64 = 0xb492b66fbe98f273;
pub const K2: u64 = 0x9ae16a3b2f90404f;
pub const K3: u64 = 0xc949d7c7509e6557;
pub const K_MUL: u64 = 0x9ddfea08eb382d69;

/// The length classes the hash dispatches on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Bucket {
    Empty,
    UpTo16,
    UpTo32,
    UpTo64,
    Over64,
}

impl Bucket {
    pub fn for_len(len: usize) -> Bucket {
        match len {
            0 => Bucket::Empty,
            1..=16 => Bucket::UpTo16,
            17..=32 => Bucket::UpTo32,
            33..=64 => Bucket::UpTo64,
            _ => Bucket::Over64,
        }
    }
}

/// Hashes all of `data`.
///
/// The empty input hashes to `0`.
pub fn hash64(data: &[u8]) -> u64 {
    match Bucket::for_len(data.len()) {
        Bucket::Empty => 0,
        Bucket::UpTo16 => hash_len_0_to_16(data),
        Bucket::UpTo32 => hash_len_17_to_32(data),
        Bucket::UpTo64 => hash_len_33_to_64(data),
        Bucket::Over64 => hash_len_65_plus(data),
    }
}

/// Hashes the first `len` bytes of `data`.
///
/// Panics if `len > data.len()`.
pub fn hash64_prefix(data: &[u8], len: usize) -> u64 {
    hash64(&data[..len])
}

/// Hashes the UTF-8 bytes of `text`.
pub fn hash64_str(text: &str) -> u64 {
    hash64(text.as_bytes())
}

/// Hashes the first `len` bytes of the UTF-8 encoding of `text`.  `len` counts
/// bytes, not characters, and may end inside a multi-byte character.
///
/// Panics if `len > text.len()`.
pub fn hash64_str_prefix(text: &str, len: usize) -> u64 {
    hash64_prefix(text.as_bytes(), len)
}

//-------------------------------------------------------------
// Readers and mixing primitives.

/// Little-endian 64-bit word at `offset`.  Requires `offset + 8 <= buf.len()`.
#[inline(always)]
fn fetch64(buf: &[u8], offset: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&buf[offset..(offset + 8)]);
    u64::from_le_bytes(word)
}

/// Little-endian 32-bit word at `offset`, zero-extended.  Requires
/// `offset + 4 <= buf.len()`.
#[inline(always)]
fn fetch32(buf: &[u8], offset: usize) -> u64 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&buf[offset..(offset + 4)]);
    u32::from_le_bytes(word) as u64
}

#[inline(always)]
fn shift_mix(value: u64) -> u64 {
    value ^ (value >> 47)
}

/// Folds two words into one.  Equivalent to CityHash's `Hash128to64`.
#[inline]
fn combine16(u: u64, v: u64) -> u64 {
    combine16_with_multiplier(u, v, K_MUL)
}

#[inline]
fn combine16_with_multiplier(u: u64, v: u64, mul: u64) -> u64 {
    let a = shift_mix((u ^ v).wrapping_mul(mul));
    let b = shift_mix((v ^ a).wrapping_mul(mul));
    b.wrapping_mul(mul)
}

#[inline(always)]
fn length_multiplier(len: usize) -> u64 {
    K2.wrapping_add((len as u64).wrapping_mul(2))
}

//-------------------------------------------------------------
// Short inputs.

/// Also handles `len == 0`, for which it returns `K2` rather than the `0`
/// that `hash64` gives for empty input.  Both are kept as-is since existing
/// digests depend on each.
fn hash_len_0_to_16(s: &[u8]) -> u64 {
    let len = s.len();
    if len >= 8 {
        let mul = length_multiplier(len);
        let a = fetch64(s, 0).wrapping_add(K2);
        let b = fetch64(s, len - 8);
        let c = b.rotate_right(37).wrapping_mul(mul).wrapping_add(a);
        let d = a.rotate_right(25).wrapping_add(b).wrapping_mul(mul);
        combine16_with_multiplier(c, d, mul)
    } else if len >= 4 {
        let mul = length_multiplier(len);
        let a = fetch32(s, 0);
        combine16_with_multiplier(
            (len as u64).wrapping_add(a << 3),
            fetch32(s, len - 4),
            mul,
        )
    } else if len > 0 {
        let a = s[0] as u64;
        let b = s[len >> 1] as u64;
        let c = s[len - 1] as u64;
        let y = a + (b << 8);
        let z = len as u64 + (c << 2);
        shift_mix(y.wrapping_mul(K2) ^ z.wrapping_mul(K0)).wrapping_mul(K2)
    } else {
        K2
    }
}

/// The 17-32 byte mix of `s[..len]`, returning the `a` term alongside the
/// digest so the 33-64 byte path can reuse it.
#[inline]
fn mix_len_17_to_32(s: &[u8], len: usize, mul: u64) -> (u64, u64) {
    let a = fetch64(s, 0).wrapping_mul(K1);
    let b = fetch64(s, 8);
    let c = fetch64(s, len - 8).wrapping_mul(mul);
    let d = fetch64(s, len - 16).wrapping_mul(K2);
    let digest = combine16_with_multiplier(
        (a.wrapping_add(b))
            .rotate_right(43)
            .wrapping_add(c.rotate_right(30))
            .wrapping_add(d),
        a.wrapping_add(b.wrapping_add(K2).rotate_right(18))
            .wrapping_add(c),
        mul,
    );
    (a, digest)
}

fn hash_len_17_to_32(s: &[u8]) -> u64 {
    let len = s.len();
    mix_len_17_to_32(s, len, length_multiplier(len)).1
}

fn hash_len_33_to_64(s: &[u8]) -> u64 {
    let len = s.len();
    let mul = length_multiplier(len);

    // First 32 bytes, exactly as a 32-byte input would be mixed (but with
    // this length's multiplier).
    let (a, z) = mix_len_17_to_32(s, 32, mul);

    // Last 32 bytes, chained on `z`.
    let e = fetch64(s, len - 32).wrapping_add(z).wrapping_mul(K1);
    let f = fetch64(s, len - 24);
    let g = fetch64(s, len - 8).wrapping_mul(mul);
    let h = fetch64(s, len - 16).wrapping_mul(K2);

    combine16_with_multiplier(
        (e.wrapping_add(f))
            .rotate_right(43)
            .wrapping_add(g.rotate_right(30))
            .wrapping_add(h),
        e.wrapping_add(f.wrapping_add(a).rotate_right(18))
            .wrapping_add(g),
        mul,
    )
}

//-------------------------------------------------------------
// Long inputs.

/// Folds `s[offset..(offset + 32)]` and two seeds into a new pair of seeds.
#[inline]
fn weak_mix(s: &[u8], offset: usize, mut a: u64, mut b: u64) -> (u64, u64) {
    let p1 = fetch64(s, offset);
    let p2 = fetch64(s, offset + 8);
    let p3 = fetch64(s, offset + 16);
    let p4 = fetch64(s, offset + 24);

    a = a.wrapping_add(p1);
    b = b.wrapping_add(a).wrapping_add(p4).rotate_right(21);
    let c = a;
    a = a.wrapping_add(p2).wrapping_add(p3);
    b = b.wrapping_add(a.rotate_right(44));

    (a.wrapping_add(p4), b.wrapping_add(c))
}

/// Start offsets of the 64-byte windows the long-input loop visits, for
/// `len > 64`.  There are `ceil((len - 1) / 64)` of them, stepping by 64.  A
/// trailing partial block is visited through the window ending at `len`, so
/// the last window may overlap the one before it.
fn block_offsets(len: usize) -> impl Iterator<Item = usize> {
    let blocks = (len - 1).div_ceil(64);
    (0..blocks).map(move |i| (i * 64).min(len - 64))
}

fn hash_len_65_plus(s: &[u8]) -> u64 {
    let len = s.len();
    debug_assert!(len > 64);

    let mut x = fetch64(s, 0);
    let mut y = fetch64(s, len - 16) ^ K1;
    let mut z = fetch64(s, len - 56) ^ K0;

    // Seed from the last 64 bytes.  Together with the block loop below this
    // covers any trailing partial block without padding.
    let v0 = (y ^ K1)
        .rotate_right(49)
        .wrapping_mul(K1)
        .wrapping_add(fetch64(s, len - 64));
    let v1 = v0
        .rotate_right(42)
        .wrapping_mul(K1)
        .wrapping_add(fetch64(s, len - 56));
    let w0 = y
        .wrapping_add(z)
        .wrapping_add(K2)
        .rotate_right(35)
        .wrapping_mul(K3)
        .wrapping_add(fetch64(s, len - 32));
    let w1 = x
        .wrapping_add(fetch64(s, len - 24))
        .rotate_right(53)
        .wrapping_mul(K3)
        .wrapping_add(fetch64(s, len - 8));
    let mut v = (v0, v1);
    let mut w = (w0, w1);

    z = z.wrapping_add(shift_mix(v.1).wrapping_mul(K1) ^ fetch64(s, len - 48));
    x = z
        .wrapping_add(x)
        .wrapping_add(fetch64(s, len - 40))
        .rotate_right(39)
        .wrapping_mul(K1);
    y = y
        .wrapping_add(fetch64(s, len - 16))
        .rotate_right(33)
        .wrapping_mul(K1);

    for offset in block_offsets(len) {
        x = x
            .wrapping_add(y)
            .wrapping_add(v.0)
            .wrapping_add(fetch64(s, offset))
            .rotate_right(37)
            .wrapping_mul(K1);
        y = y
            .wrapping_add(v.1)
            .wrapping_add(fetch64(s, offset + 8))
            .rotate_right(42)
            .wrapping_mul(K1);
        x ^= w.1;
        y = y.wrapping_add(v.0);
        z = z.wrapping_add(w.0).rotate_right(33).wrapping_mul(K1);

        // The two halves feed each other's seeds on the next block.
        v = weak_mix(s, offset, v.1.wrapping_mul(K1), x.wrapping_add(w.0));
        w = weak_mix(
            s,
            offset + 32,
            z.wrapping_add(w.1),
            y.wrapping_add(fetch64(s, offset + 16)),
        );
        std::mem::swap(&mut z, &mut x);
    }

    combine16(
        combine16(v.0, w.0)
            .wrapping_add(shift_mix(y).wrapping_mul(K1))
            .wrapping_add(z),
        combine16(v.1, w.1).wrapping_add(x),
    )
}
