//! Bone tables of the two capture rigs.
//!
//! Both rigs deliver one fixed-size block of joints per frame. Several frames are usually stacked
//! into one point set, so every helper here works on `joints_per_frame` sized blocks.

/// Number of keypoints of the OpenPose BODY_25 model.
pub const OPENPOSE_BODY25_NUM_JOINTS: usize = 25;

/// Mid-hip keypoint of the BODY_25 model, used to estimate the trajectory scale.
pub const OPENPOSE_MID_HIP: usize = 8;

/// Bones of the BODY_25 model as pairs of keypoint indices.
pub const OPENPOSE_BODY25_BONES: [[usize; 2]; 24] = [
    // neck
    [1, 0],
    [1, 8],
    [1, 2],
    [1, 5],
    // head
    [0, 15],
    [15, 16],
    [0, 17],
    [17, 18],
    // crotch
    [8, 9],
    [8, 12],
    // left arm
    [2, 3],
    [3, 4],
    // right arm
    [5, 6],
    [6, 7],
    // left leg
    [9, 10],
    [10, 11],
    [11, 22],
    [11, 23],
    [11, 24],
    // right leg
    [12, 13],
    [13, 14],
    [14, 19],
    [14, 20],
    [14, 21],
];

/// Number of markers of the optical motion-capture body model.
pub const MOCAP_NUM_MARKERS: usize = 62;

/// Marker used to estimate the trajectory scale of the optical rig.
pub const MOCAP_ROOT_MARKER: usize = 29;

/// Bones of the optical marker model as pairs of marker indices.
pub const MOCAP_BONES: [[usize; 2]; 74] = [
    // head
    [0, 1],
    [0, 2],
    [1, 3],
    [2, 3],
    // crotch
    [2, 24],
    [3, 24],
    [22, 23],
    [22, 24],
    [24, 25],
    [25, 26],
    [26, 27],
    [27, 28],
    [23, 29],
    [29, 32],
    [29, 33],
    // left arm
    [25, 15],
    [13, 14],
    [14, 15],
    [22, 13],
    [15, 16],
    [16, 17],
    [13, 18],
    [17, 20],
    [18, 19],
    [19, 21],
    [20, 21],
    // right arm
    [25, 6],
    [4, 5],
    [5, 6],
    [22, 4],
    [6, 7],
    [7, 8],
    [4, 9],
    [9, 10],
    [8, 11],
    [10, 12],
    [11, 12],
    // waist
    [30, 31],
    [30, 32],
    [31, 33],
    [32, 33],
    // left leg
    [31, 48],
    [33, 48],
    [31, 49],
    [33, 49],
    [48, 50],
    [49, 51],
    [50, 52],
    [51, 53],
    [53, 54],
    [54, 55],
    [52, 55],
    // left foot
    [55, 56],
    [56, 57],
    [55, 58],
    [58, 59],
    [59, 60],
    [58, 61],
    // right leg
    [30, 34],
    [32, 34],
    [30, 35],
    [34, 36],
    [35, 37],
    [36, 38],
    [37, 39],
    [39, 40],
    [38, 41],
    [40, 41],
    // right foot
    [41, 42],
    [41, 43],
    [41, 44],
    [44, 45],
    [45, 46],
    [44, 47],
];

/// Error types for skeleton helpers.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum SkeletonError {
    /// The number of points is not a multiple of the frame size.
    #[error("{num_points} points cannot be split into frames of {joints_per_frame} joints")]
    FrameMismatch {
        /// Number of points in the set.
        num_points: usize,
        /// Number of joints of one frame.
        joints_per_frame: usize,
    },

    /// A bone references a joint outside of the frame.
    #[error("Bone joint {joint} is out of range for frames of {joints_per_frame} joints")]
    JointOutOfRange {
        /// Offending joint index.
        joint: usize,
        /// Number of joints of one frame.
        joints_per_frame: usize,
    },
}

/// A line segment between two joints.
pub type Segment = ([f64; 3], [f64; 3]);

/// Expand a bone table over every frame stacked in `points`.
///
/// # Arguments
///
/// * `points` - Stacked frames, `joints_per_frame` points each.
/// * `bones` - Pairs of joint indices within one frame.
/// * `joints_per_frame` - Number of joints of one frame.
///
/// # Returns
///
/// The segments of frame 0 followed by the segments of frame 1 and so on.
pub fn bone_segments(
    points: &[[f64; 3]],
    bones: &[[usize; 2]],
    joints_per_frame: usize,
) -> Result<Vec<Segment>, SkeletonError> {
    if joints_per_frame == 0 || points.len() % joints_per_frame != 0 {
        return Err(SkeletonError::FrameMismatch {
            num_points: points.len(),
            joints_per_frame,
        });
    }

    if let Some(&joint) = bones.iter().flatten().find(|&&j| j >= joints_per_frame) {
        return Err(SkeletonError::JointOutOfRange {
            joint,
            joints_per_frame,
        });
    }

    let segments = points
        .chunks_exact(joints_per_frame)
        .flat_map(|frame| bones.iter().map(move |&[a, b]| (frame[a], frame[b])))
        .collect();

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bone_tables_in_range() {
        assert!(OPENPOSE_BODY25_BONES
            .iter()
            .flatten()
            .all(|&j| j < OPENPOSE_BODY25_NUM_JOINTS));
        assert!(MOCAP_BONES.iter().flatten().all(|&j| j < MOCAP_NUM_MARKERS));
    }

    #[test]
    fn test_bone_segments_two_frames() -> Result<(), SkeletonError> {
        let points = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [10.0, 0.0, 0.0],
            [11.0, 0.0, 0.0],
            [10.0, 1.0, 0.0],
        ];
        let bones = [[0, 1], [0, 2]];
        let segments = bone_segments(&points, &bones, 3)?;

        assert_eq!(segments.len(), 4);
        assert_eq!(segments[0], ([0.0, 0.0, 0.0], [1.0, 0.0, 0.0]));
        assert_eq!(segments[3], ([10.0, 0.0, 0.0], [10.0, 1.0, 0.0]));
        Ok(())
    }

    #[test]
    fn test_bone_segments_errors() {
        let points = vec![[0.0; 3]; 5];
        assert_eq!(
            bone_segments(&points, &[[0, 1]], 3),
            Err(SkeletonError::FrameMismatch {
                num_points: 5,
                joints_per_frame: 3
            })
        );
        assert_eq!(
            bone_segments(&points, &[[0, 7]], 5),
            Err(SkeletonError::JointOutOfRange {
                joint: 7,
                joints_per_frame: 5
            })
        );
    }
}
