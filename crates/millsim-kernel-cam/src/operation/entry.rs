//! Entry moves from above the stock down to a cutting level.

use std::f64::consts::TAU;

use millsim_kernel_geom::{Point2, Point3, Vec2, EPSILON};

use crate::{EntryKind, ToolpathParameters};

/// Minimum helix samples per revolution.
pub const HELIX_SEGMENTS_PER_REV: usize = 16;

const MAX_RAMP_LEGS: usize = 1000;

/// Straight vertical descent at `start`.
pub fn plunge_entry(start: Point2, from_z: f64, to_z: f64) -> Vec<Point3> {
    vec![
        Point3::new(start.x, start.y, from_z),
        Point3::new(start.x, start.y, to_z),
    ]
}

/// Zig-zag ramp descending along `direction` from `start`.
///
/// Each leg descends at exactly `angle_deg` to the XY plane. Legs are at
/// most `max_leg` long and come in pairs, so the ramp ends back at `start`
/// on `to_z`.
pub fn ramp_entry(
    start: Point2,
    direction: Vec2,
    max_leg: f64,
    from_z: f64,
    to_z: f64,
    angle_deg: f64,
) -> Vec<Point3> {
    let dz = from_z - to_z;
    let norm = direction.norm();
    let tan = angle_deg.to_radians().tan();
    if dz <= EPSILON || norm <= EPSILON || !(tan > EPSILON) {
        return plunge_entry(start, from_z, to_z);
    }
    let dir = direction / norm;

    let run = dz / tan;
    let leg_limit = if max_leg.is_finite() && max_leg > EPSILON {
        max_leg
    } else {
        run
    };
    let mut legs = ((run / leg_limit).ceil() as usize).clamp(2, MAX_RAMP_LEGS);
    if legs % 2 == 1 {
        legs += 1;
    }
    let leg = run / legs as f64;

    let mut points = Vec::with_capacity(legs + 1);
    points.push(Point3::new(start.x, start.y, from_z));
    for k in 1..=legs {
        let p = if k % 2 == 1 { start + dir * leg } else { start };
        let z = from_z - dz * k as f64 / legs as f64;
        points.push(Point3::new(p.x, p.y, z));
    }
    points
}

/// Helical descent around `center`.
///
/// The tool circles at `radius`, starting at angle zero, with Z falling
/// linearly with the swept angle from `from_z` to `to_z`. Without an
/// explicit revolution count, the pitch is `dz * tan(angle)` and the count
/// is `dz / pitch`. At least [`HELIX_SEGMENTS_PER_REV`] samples are taken per
/// revolution.
pub fn helix_entry(
    center: Point2,
    radius: f64,
    from_z: f64,
    to_z: f64,
    angle_deg: f64,
    revolutions: Option<f64>,
) -> Vec<Point3> {
    let dz = from_z - to_z;
    if dz <= EPSILON || radius <= EPSILON {
        return plunge_entry(center, from_z, to_z);
    }

    let revs = match revolutions {
        Some(r) if r > 0.0 => r,
        _ => {
            let pitch = dz * angle_deg.to_radians().tan();
            if pitch > EPSILON {
                dz / pitch
            } else {
                1.0
            }
        }
    };
    let samples =
        ((revs * HELIX_SEGMENTS_PER_REV as f64).ceil() as usize).max(HELIX_SEGMENTS_PER_REV);

    (0..=samples)
        .map(|k| {
            let t = k as f64 / samples as f64;
            let theta = TAU * revs * t;
            Point3::new(
                center.x + radius * theta.cos(),
                center.y + radius * theta.sin(),
                from_z - dz * t,
            )
        })
        .collect()
}

/// Entry move for the configured kind onto the first point of `path`.
pub(crate) fn entry_move(
    params: &ToolpathParameters,
    path: &[Point2],
    from_z: f64,
    to_z: f64,
) -> Vec<Point3> {
    let Some(&start) = path.first() else {
        return Vec::new();
    };
    if from_z - to_z <= EPSILON {
        return vec![Point3::new(start.x, start.y, to_z)];
    }

    match params.entry {
        EntryKind::Plunge => plunge_entry(start, from_z, to_z),
        EntryKind::Ramp => {
            let (direction, leg) = match path.get(1) {
                Some(next) => (next - start, (next - start).norm()),
                None => (Vec2::new(1.0, 0.0), f64::INFINITY),
            };
            ramp_entry(start, direction, leg, from_z, to_z, params.ramp_angle)
        }
        EntryKind::Helix => {
            let radius = params.tool.diameter * params.helix_diameter / 2.0;
            let mut points = helix_entry(
                start,
                radius,
                from_z,
                to_z,
                params.helix_angle,
                params.helix_revolutions,
            );
            points.push(Point3::new(start.x, start.y, to_z));
            points
        }
    }
}
