//! Typed constructs for the AWS services the zkcir deployment uses.
//!
//! Each construct is a builder that expands into one or more raw
//! CloudFormation resources inside a [`Stack`](crate::stack::Stack). Props
//! structs carry the knobs a construct accepts; anything left at its default
//! matches what the CDK would synthesize.
//!
//! ## Available Constructs
//!
//! - [`ec2`]: VPC, subnets, gateway endpoints and security groups
//! - [`iam`]: roles, policy statements and grant bookkeeping
//! - [`cognito`]: user pool, Google federation, hosted domain and app client
//! - [`secrets`]: Secrets Manager references
//! - [`acm`]: TLS certificates
//! - [`ecs`]: cluster, Fargate task definition, container and service
//! - [`elbv2`]: application load balancer, listeners and target groups
//! - [`lambda`]: container image functions
//! - [`dynamodb`]: tables
//! - [`s3`]: buckets, including auto-delete on teardown
//! - [`logs`]: log groups and retention

pub mod acm;
pub mod cognito;
pub mod dynamodb;
pub mod ec2;
pub mod ecs;
pub mod elbv2;
pub mod iam;
pub mod lambda;
pub mod logs;
pub mod s3;
pub mod secrets;

use crate::template::DeletionPolicy;

/// Implements [`Construct`](crate::stack::Construct) for a struct with
/// `path: Vec<String>` and `logical_id: String` fields.
macro_rules! impl_construct {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::stack::Construct for $ty {
                fn path(&self) -> &[String] {
                    &self.path
                }

                fn logical_id(&self) -> &str {
                    &self.logical_id
                }
            }
        )+
    };
}
pub(crate) use impl_construct;

/// Construct path of a child, given its parent's path.
pub fn child_path(parent: &[String], ids: &[&str]) -> Vec<String> {
    parent
        .iter()
        .cloned()
        .chain(ids.iter().map(|s| s.to_string()))
        .collect()
}

/// What happens to a resource when it is removed from the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RemovalPolicy {
    /// Delete the physical resource
    Destroy,
    /// Keep the physical resource
    #[default]
    Retain,
    /// Snapshot before deleting (where supported)
    Snapshot,
}

impl RemovalPolicy {
    /// Template-level policy for this removal policy.
    pub fn deletion_policy(self) -> DeletionPolicy {
        match self {
            RemovalPolicy::Destroy => DeletionPolicy::Delete,
            RemovalPolicy::Retain => DeletionPolicy::Retain,
            RemovalPolicy::Snapshot => DeletionPolicy::Snapshot,
        }
    }
}

/// An amount of storage or memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Size {
    mebibytes: u64,
}

impl Size {
    /// Size in MiB
    pub const fn mebibytes(amount: u64) -> Self {
        Self { mebibytes: amount }
    }

    /// Size in GiB
    pub const fn gibibytes(amount: u64) -> Self {
        Self {
            mebibytes: amount.saturating_mul(1024),
        }
    }

    /// Value in MiB
    pub const fn to_mebibytes(self) -> u64 {
        self.mebibytes
    }
}

/// A span of time with second granularity.
///
/// Constructors saturate at `u64::MAX` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Duration {
    seconds: u64,
}

impl Duration {
    /// Duration in seconds
    pub const fn seconds(amount: u64) -> Self {
        Self { seconds: amount }
    }

    /// Duration in minutes
    pub const fn minutes(amount: u64) -> Self {
        Self {
            seconds: amount.saturating_mul(60),
        }
    }

    /// Duration in hours
    pub const fn hours(amount: u64) -> Self {
        Self {
            seconds: amount.saturating_mul(3600),
        }
    }

    /// Duration in days
    pub const fn days(amount: u64) -> Self {
        Self {
            seconds: amount.saturating_mul(86_400),
        }
    }

    /// Whole seconds
    pub const fn to_seconds(self) -> u64 {
        self.seconds
    }

    /// Whole minutes, rounded down
    pub const fn to_minutes(self) -> u64 {
        self.seconds / 60
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_conversions() {
        assert_eq!(Size::gibibytes(2).to_mebibytes(), 2048);
        assert!(Size::mebibytes(512) < Size::gibibytes(1));
    }

    #[test]
    fn test_duration_conversions() {
        assert_eq!(Duration::days(1).to_minutes(), 1440);
        assert_eq!(Duration::seconds(30).to_seconds(), 30);
        assert_eq!(Duration::hours(2), Duration::minutes(120));
    }

    #[test]
    fn test_huge_amounts_saturate() {
        let huge = 60 + (1u64 << 62);
        assert_eq!(Duration::minutes(huge).to_seconds(), u64::MAX);
        assert!(Duration::minutes(huge) > Duration::days(1));
        assert_eq!(Size::gibibytes(u64::MAX).to_mebibytes(), u64::MAX);
    }

    #[test]
    fn test_removal_policy() {
        assert_eq!(
            RemovalPolicy::Destroy.deletion_policy(),
            DeletionPolicy::Delete
        );
        assert_eq!(RemovalPolicy::default(), RemovalPolicy::Retain);
    }

    #[test]
    fn test_child_path() {
        let parent = vec!["TaskDef".to_string()];
        assert_eq!(
            child_path(&parent, &["TaskRole", "Resource"]),
            vec!["TaskDef", "TaskRole", "Resource"]
        );
    }
}
