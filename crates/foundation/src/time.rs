/// Engine time in seconds.
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd, Default)]
pub struct Time(pub f64);

impl Time {
    pub const ZERO: Time = Time(0.0);

    pub fn after(self, seconds: f64) -> Self {
        Time(self.0 + seconds)
    }

    pub fn seconds(self) -> f64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::Time;

    #[test]
    fn after_adds_seconds() {
        assert_eq!(Time(1.5).after(0.25), Time(1.75));
        assert!(Time::ZERO < Time(0.1));
    }
}
