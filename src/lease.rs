/// Lease limits the server grants, all in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseConfig {
    pub min_lease: u32,
    pub max_lease: u32,
    pub min_key_lease: u32,
    pub max_key_lease: u32,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            min_lease: 60 * 30,             // 30 minutes
            max_lease: 3600 * 2,            // 2 hours
            min_key_lease: 3600 * 24,       // 1 day
            max_key_lease: 3600 * 24 * 14,  // 14 days
        }
    }
}

impl LeaseConfig {
    /// Expiries run on a millisecond timer; this bound keeps them inside
    /// its domain.
    pub const MAX_KEY_LEASE: u32 = (1 << 31) / 1000;

    pub fn is_valid(&self) -> bool {
        self.max_key_lease <= Self::MAX_KEY_LEASE
            && self.min_lease <= self.max_lease
            && self.min_key_lease <= self.max_key_lease
            && self.min_lease <= self.min_key_lease
            && self.max_lease <= self.max_key_lease
    }

    /// Clamps a requested lease into the configured window. Zero passes
    /// through: it requests removal.
    pub fn grant_lease(&self, lease: u32) -> u32 {
        if lease == 0 {
            0
        } else {
            lease.clamp(self.min_lease, self.max_lease)
        }
    }

    pub fn grant_key_lease(&self, key_lease: u32) -> u32 {
        if key_lease == 0 {
            0
        } else {
            key_lease.clamp(self.min_key_lease, self.max_key_lease)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(LeaseConfig::default().is_valid());
    }

    #[test]
    fn ordering_violations_are_invalid() {
        let mut config = LeaseConfig::default();
        config.min_lease = config.max_lease + 1;
        assert!(!config.is_valid());

        let mut config = LeaseConfig::default();
        config.min_key_lease = config.min_lease - 1;
        assert!(!config.is_valid());

        let mut config = LeaseConfig::default();
        config.max_lease = config.max_key_lease + 1;
        assert!(!config.is_valid());
    }

    #[test]
    fn timer_domain_bound() {
        let config = LeaseConfig {
            min_lease: 60,
            max_lease: 3600,
            min_key_lease: 600,
            max_key_lease: LeaseConfig::MAX_KEY_LEASE + 1,
        };
        assert!(!config.is_valid());
    }

    #[test]
    fn grants_clamp_and_keep_zero() {
        let config = LeaseConfig {
            min_lease: 60,
            max_lease: 3600,
            min_key_lease: 600,
            max_key_lease: 86400,
        };
        assert_eq!(config.grant_lease(0), 0);
        assert_eq!(config.grant_lease(30), 60);
        assert_eq!(config.grant_lease(1800), 1800);
        assert_eq!(config.grant_lease(7200), 3600);
        assert_eq!(config.grant_key_lease(0), 0);
        assert_eq!(config.grant_key_lease(u32::MAX), 86400);
    }
}
