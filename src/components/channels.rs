//! Plane identity across a save/reload cycle.
//!
//! The container enumerates channels canonically (lexicographically by
//! name) rather than in save order, so the plane order used at write time
//! has to be recovered from the names themselves on read.

use crate::components::format::PixelFormat;

/// On-disk channel name for each plane, in plane order.
///
/// Three- and four-plane images with an RGB/RGBA pixel semantic get the
/// conventional "R","G","B"[,"A"] labels; everything else gets a generic
/// per-plane label.
pub fn channel_labels(pixel_format: PixelFormat, planes: usize) -> Vec<String> {
    match (pixel_format, planes) {
        (PixelFormat::Rgb, 3) => vec!["R".into(), "G".into(), "B".into()],
        (PixelFormat::Rgba, 4) => vec!["R".into(), "G".into(), "B".into(), "A".into()],
        _ => (0..planes).map(|i| format!("Channel{i}")).collect(),
    }
}

/// Recover plane order from the container's channel enumeration.
///
/// Returns, per output plane, the position of its channel within `names`.
/// A complete {R,G,B} set on a 3-plane image is forced to [R,G,B] order,
/// a complete {R,G,B,A} set on a 4-plane image to [R,G,B,A]. Any other
/// naming scheme keeps the native enumeration order, which may differ
/// from the order used at write time.
pub fn canonical_order(names: &[String]) -> Vec<usize> {
    let pos = |label: &str| names.iter().position(|name| name == label);
    match names.len() {
        3 => {
            if let (Some(r), Some(g), Some(b)) = (pos("R"), pos("G"), pos("B")) {
                return vec![r, g, b];
            }
        }
        4 => {
            if let (Some(r), Some(g), Some(b), Some(a)) = (pos("R"), pos("G"), pos("B"), pos("A"))
            {
                return vec![r, g, b, a];
            }
        }
        _ => {}
    }
    (0..names.len()).collect()
}

/// Container enumeration of a label table: indices of `labels` sorted
/// lexicographically by name. Element `q` is the plane stored at
/// container position `q`.
pub fn container_enumeration(labels: &[String]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..labels.len()).collect();
    order.sort_by(|&a, &b| labels[a].cmp(&labels[b]));
    order
}
