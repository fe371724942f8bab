//! Z-order (Morton) bit interleaving.
//!
//! Two 16-bit grid coordinates are merged into one 32-bit value by taking
//! the even bits from `x` and the odd bits from `y`. Tiles that are close on
//! the map end up with close Morton values, which is what gives column keys
//! their on-disk locality.
//!
//! The mask-and-shift sequence below defines the on-disk column ordering of
//! every tile already written. It must stay bit-exact.

/// Spread the low 16 bits of `n` so that bit `i` lands on bit `2 * i`.
///
/// Bits above the 16th are discarded first, so inputs of 65536 and above
/// alias smaller values rather than failing.
#[inline]
pub const fn part1by1(n: u32) -> u32 {
    let mut n = n & 0x0000_ffff;
    n = (n | (n << 8)) & 0x00FF_00FF;
    n = (n | (n << 4)) & 0x0F0F_0F0F;
    n = (n | (n << 2)) & 0x3333_3333;
    n = (n | (n << 1)) & 0x5555_5555;
    n
}

/// Interleave `x` (even bits) and `y` (odd bits) into a Morton code.
#[inline]
pub const fn interleave2(x: u32, y: u32) -> u32 {
    part1by1(x) | (part1by1(y) << 1)
}

/// Inverse of [`part1by1`]: gather the even bits of `n` into the low 16 bits.
#[inline]
pub const fn compact1by1(n: u32) -> u32 {
    let mut n = n & 0x5555_5555;
    n = (n | (n >> 1)) & 0x3333_3333;
    n = (n | (n >> 2)) & 0x0F0F_0F0F;
    n = (n | (n >> 4)) & 0x00FF_00FF;
    n = (n | (n >> 8)) & 0x0000_ffff;
    n
}

/// Inverse of [`interleave2`] for 16-bit inputs, returning `(x, y)`.
#[inline]
pub const fn deinterleave2(code: u32) -> (u32, u32) {
    (compact1by1(code), compact1by1(code >> 1))
}
