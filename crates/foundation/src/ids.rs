/// Identifies a data layer on the compute channel.
///
/// `LayerId(0)` is reserved for service-scoped traffic (lifecycle messages and
/// broadcasts); real layers are numbered from 1.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LayerId(pub u64);

impl LayerId {
    pub const SERVICE: LayerId = LayerId(0);

    pub fn new(n: u64) -> Self {
        LayerId(n)
    }

    pub fn is_service(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
