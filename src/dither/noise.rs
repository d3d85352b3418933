//! 2D simplex gradient noise used for the animated grain overlay.
//!
//! Lattice hashing uses the `mod 289` permutation polynomial so the CPU path and
//! `dither.wgsl` agree to within float rounding.

const C_X: f32 = 0.211_324_87; // (3 - sqrt(3)) / 6
const C_Y: f32 = 0.366_025_42; // (sqrt(3) - 1) / 2
const C_Z: f32 = -0.577_350_26; // -1 + 2 * C_X
const C_W: f32 = 0.024_390_243; // 1 / 41

#[inline]
fn mod289(x: f32) -> f32 {
    x - (x * (1.0 / 289.0)).floor() * 289.0
}

#[inline]
fn permute(x: f32) -> f32 {
    mod289((x * 34.0 + 1.0) * x)
}

#[inline]
fn fract(x: f32) -> f32 {
    x - x.floor()
}

/// Simplex noise at `(x, y)`. Continuous, roughly within `[-1, 1]`.
pub fn simplex2(x: f32, y: f32) -> f32 {
    let skew = (x + y) * C_Y;
    let mut ix = (x + skew).floor();
    let mut iy = (y + skew).floor();

    let unskew = (ix + iy) * C_X;
    let x0 = [x - ix + unskew, y - iy + unskew];
    let i1 = if x0[0] > x0[1] { [1.0, 0.0] } else { [0.0, 1.0] };

    let x1 = [x0[0] + C_X - i1[0], x0[1] + C_X - i1[1]];
    let x2 = [x0[0] + C_Z, x0[1] + C_Z];

    ix = mod289(ix);
    iy = mod289(iy);
    let p = [
        permute(permute(iy) + ix),
        permute(permute(iy + i1[1]) + ix + i1[0]),
        permute(permute(iy + 1.0) + ix + 1.0),
    ];

    let corners = [x0, x1, x2];
    let mut total = 0.0;
    for (corner, hash) in corners.iter().zip(p) {
        let falloff = (0.5 - (corner[0] * corner[0] + corner[1] * corner[1])).max(0.0);
        if falloff == 0.0 {
            continue;
        }
        let mut m = falloff * falloff;
        m *= m;

        let gx = 2.0 * fract(hash * C_W) - 1.0;
        let h = gx.abs() - 0.5;
        let a0 = gx - (gx + 0.5).floor();
        m *= 1.792_842_9 - 0.853_734_73 * (a0 * a0 + h * h);

        total += m * (a0 * corner[0] + h * corner[1]);
    }

    130.0 * total
}

/// Grain perturbation for a screen position at `elapsed` seconds, before scaling.
pub fn grain_field(screen_x: f32, screen_y: f32, elapsed: f32) -> f32 {
    let drift = elapsed * 0.1;
    simplex2(screen_x * 0.5 + drift, screen_y * 0.5 + drift)
}
