//! Flexible macroblock ordering: the map-unit to slice-group map of section 8.2.2.
//!
//! The map is only used to tell whether a picture's slices can arrive out of raster order.

use super::pps::{PicParameterSet, SliceGroupChangeType, SliceGroupMap};
use super::sps::SeqParameterSet;

/// Builds `mapUnitToSliceGroupMap` for a picture using `pps`, one entry per map unit.
pub fn slice_group_map(
    pps: &PicParameterSet,
    sps: &SeqParameterSet,
    slice_group_change_cycle: u32,
) -> Vec<u8> {
    let width = sps.pic_width_in_mbs() as usize;
    let height = sps.pic_height_in_map_units() as usize;
    let size = width.saturating_mul(height);
    let Some(groups) = pps.slice_groups.as_ref() else {
        return vec![0; size];
    };
    let num_slice_groups_minus1 = groups.num_slice_groups_minus1 as usize;
    match &groups.map {
        SliceGroupMap::Interleaved { run_length_minus1 } => interleaved(size, run_length_minus1),
        SliceGroupMap::Dispersed => (0..size)
            .map(|i| {
                (((i % width) + (((i / width) * (num_slice_groups_minus1 + 1)) / 2))
                    % (num_slice_groups_minus1 + 1)) as u8
            })
            .collect(),
        SliceGroupMap::ForegroundAndLeftover { rectangles } => {
            let mut map = vec![num_slice_groups_minus1 as u8; size];
            for (group, rect) in rectangles.iter().enumerate().rev() {
                let (top, left) = (rect.top_left as usize / width, rect.top_left as usize % width);
                let (bottom, right) = (
                    rect.bottom_right as usize / width,
                    rect.bottom_right as usize % width,
                );
                for y in top..=bottom.min(height.saturating_sub(1)) {
                    for x in left..=right {
                        map[y * width + x] = group as u8;
                    }
                }
            }
            map
        }
        SliceGroupMap::Changing {
            change_type,
            slice_group_change_direction_flag,
            slice_group_change_rate_minus1,
        } => {
            let units_in_group0 = (slice_group_change_cycle as usize)
                .saturating_mul(*slice_group_change_rate_minus1 as usize + 1)
                .min(size);
            let dir = *slice_group_change_direction_flag;
            match change_type {
                SliceGroupChangeType::BoxOut => box_out(width, height, units_in_group0, dir),
                SliceGroupChangeType::RasterScan => {
                    let upper_left = if dir { size - units_in_group0 } else { units_in_group0 };
                    (0..size)
                        .map(|i| u8::from(if i < upper_left { dir } else { !dir }))
                        .collect()
                }
                SliceGroupChangeType::WipeOut => {
                    let upper_left = if dir { size - units_in_group0 } else { units_in_group0 };
                    let mut map = vec![0; size];
                    let mut k = 0;
                    for x in 0..width {
                        for y in 0..height {
                            map[y * width + x] = u8::from(if k < upper_left { dir } else { !dir });
                            k += 1;
                        }
                    }
                    map
                }
            }
        }
        SliceGroupMap::ExplicitAssignment { slice_group_id } => (0..size)
            .map(|i| slice_group_id.get(i).map_or(0, |&g| g as u8))
            .collect(),
    }
}

fn interleaved(size: usize, run_length_minus1: &[u32]) -> Vec<u8> {
    let mut map = vec![0; size];
    if run_length_minus1.is_empty() {
        return map;
    }
    let mut i = 0;
    while i < size {
        for (group, run) in run_length_minus1.iter().enumerate() {
            if i >= size {
                break;
            }
            let run = *run as usize + 1;
            for j in 0..run.min(size - i) {
                map[i + j] = group as u8;
            }
            i += run;
        }
    }
    map
}

/// Map type 3, a box growing clockwise (or counter-clockwise) from the picture centre.
fn box_out(width: usize, height: usize, units_in_group0: usize, dir: bool) -> Vec<u8> {
    let (w, h) = (width as i64, height as i64);
    let d = i64::from(dir);
    let mut map = vec![1u8; width * height];
    let mut x = (w - d) / 2;
    let mut y = (h - d) / 2;
    let (mut left, mut top) = (x, y);
    let (mut right, mut bottom) = (x, y);
    let (mut x_dir, mut y_dir) = (d - 1, d);
    let mut k = 0;
    while k < units_in_group0 {
        let idx = (y * w + x) as usize;
        let vacant = map[idx] == 1;
        if vacant {
            map[idx] = 0;
            k += 1;
        }
        if x_dir == -1 && x == left {
            left = (left - 1).max(0);
            x = left;
            x_dir = 0;
            y_dir = 2 * d - 1;
        } else if x_dir == 1 && x == right {
            right = (right + 1).min(w - 1);
            x = right;
            x_dir = 0;
            y_dir = 1 - 2 * d;
        } else if y_dir == -1 && y == top {
            top = (top - 1).max(0);
            y = top;
            x_dir = 1 - 2 * d;
            y_dir = 0;
        } else if y_dir == 1 && y == bottom {
            bottom = (bottom + 1).min(h - 1);
            y = bottom;
            x_dir = 2 * d - 1;
            y_dir = 0;
        } else {
            x += x_dir;
            y += y_dir;
        }
    }
    map
}

/// True when some slice group is split over more than one raster-order run.
pub fn is_discontiguous(map: &[u8]) -> bool {
    let runs = 1 + map.windows(2).filter(|w| w[0] != w[1]).count();
    let mut seen = [false; 256];
    for &g in map {
        seen[g as usize] = true;
    }
    let groups = seen.iter().filter(|s| **s).count();
    !map.is_empty() && runs > groups
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::nal::pps::{SliceGroups, SliceRect};
    use crate::rbsp::BitReader;
    use crate::testutil::{self, SpsParams};
    use crate::Context;

    fn sps(width_mbs: u32, height_map_units: u32) -> SeqParameterSet {
        let data = testutil::sps_rbsp(&SpsParams {
            width_mbs,
            height_map_units,
            ..SpsParams::default()
        });
        SeqParameterSet::from_bits(BitReader::new(&data)).unwrap()
    }

    fn pps_with(map: SliceGroupMap, num_slice_groups_minus1: u32) -> PicParameterSet {
        let mut ctx = Context::default();
        ctx.put_seq_param_set(sps(4, 4));
        let data = testutil::pps_rbsp(0, 0, false);
        let mut pps = PicParameterSet::from_bits(&ctx, BitReader::new(&data)).unwrap();
        pps.slice_groups = Some(SliceGroups {
            num_slice_groups_minus1,
            map,
        });
        pps
    }

    #[test]
    fn single_group() {
        let mut pps = pps_with(SliceGroupMap::Dispersed, 1);
        pps.slice_groups = None;
        let map = slice_group_map(&pps, &sps(4, 4), 0);
        assert_eq!(map, vec![0; 16]);
        assert!(!is_discontiguous(&map));
    }

    #[test]
    fn interleaved_runs() {
        let pps = pps_with(
            SliceGroupMap::Interleaved {
                run_length_minus1: vec![1, 2],
            },
            1,
        );
        let map = slice_group_map(&pps, &sps(4, 2), 0);
        assert_eq!(map, vec![0, 0, 1, 1, 1, 0, 0, 1]);
        assert!(is_discontiguous(&map));
    }

    #[test]
    fn dispersed() {
        let pps = pps_with(SliceGroupMap::Dispersed, 1);
        let map = slice_group_map(&pps, &sps(4, 2), 0);
        assert_eq!(map, vec![0, 1, 0, 1, 1, 0, 1, 0]);
        assert!(is_discontiguous(&map));
    }

    #[test]
    fn foreground_and_leftover() {
        let pps = pps_with(
            SliceGroupMap::ForegroundAndLeftover {
                rectangles: vec![SliceRect {
                    top_left: 5,
                    bottom_right: 10,
                }],
            },
            1,
        );
        let map = slice_group_map(&pps, &sps(4, 4), 0);
        #[rustfmt::skip]
        assert_eq!(map, vec![
            1, 1, 1, 1,
            1, 0, 0, 1,
            1, 0, 0, 1,
            1, 1, 1, 1,
        ]);
        assert!(is_discontiguous(&map));
    }

    #[test]
    fn box_out_from_centre() {
        let pps = pps_with(
            SliceGroupMap::Changing {
                change_type: SliceGroupChangeType::BoxOut,
                slice_group_change_direction_flag: false,
                slice_group_change_rate_minus1: 0,
            },
            1,
        );
        let map = slice_group_map(&pps, &sps(3, 3), 1);
        assert_eq!(map.iter().filter(|g| **g == 0).count(), 1);
        assert_eq!(map[4], 0);
        let all = slice_group_map(&pps, &sps(3, 3), 9);
        assert_eq!(all, vec![0; 9]);
    }

    #[test]
    fn raster_and_wipe() {
        let raster = pps_with(
            SliceGroupMap::Changing {
                change_type: SliceGroupChangeType::RasterScan,
                slice_group_change_direction_flag: false,
                slice_group_change_rate_minus1: 2,
            },
            1,
        );
        let map = slice_group_map(&raster, &sps(4, 2), 1);
        assert_eq!(map, vec![0, 0, 0, 1, 1, 1, 1, 1]);
        assert!(!is_discontiguous(&map));

        let wipe = pps_with(
            SliceGroupMap::Changing {
                change_type: SliceGroupChangeType::WipeOut,
                slice_group_change_direction_flag: false,
                slice_group_change_rate_minus1: 1,
            },
            1,
        );
        let map = slice_group_map(&wipe, &sps(4, 2), 1);
        assert_eq!(map, vec![0, 1, 1, 1, 0, 1, 1, 1]);
        assert!(is_discontiguous(&map));
    }

    #[test]
    fn explicit() {
        let pps = pps_with(
            SliceGroupMap::ExplicitAssignment {
                slice_group_id: vec![0, 0, 1, 1],
            },
            1,
        );
        let map = slice_group_map(&pps, &sps(2, 2), 0);
        assert_eq!(map, vec![0, 0, 1, 1]);
        assert!(!is_discontiguous(&map));
    }
}
