use foundation::time::Time;

/// Deterministic frame metadata.
///
/// Frames are the only clock the engine reads: retry timers and camera updates
/// are driven by `Frame::time`, so a run can be replayed exactly.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Frame {
    /// 0-based frame index.
    pub index: u64,
    /// Fixed delta time (seconds).
    pub dt_s: f64,
    /// Engine time at the start of the frame.
    pub time: Time,
}

impl Frame {
    pub fn new(index: u64, dt_s: f64) -> Self {
        Self {
            index,
            dt_s,
            time: Time(index as f64 * dt_s),
        }
    }

    pub fn first(dt_s: f64) -> Self {
        Self::new(0, dt_s)
    }

    pub fn next(self) -> Self {
        Self::new(self.index + 1, self.dt_s)
    }
}
