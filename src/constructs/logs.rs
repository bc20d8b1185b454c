//! CloudWatch log groups.

use serde_json::json;

use super::iam::{self, GrantKind, PolicyStatement, Role};
use super::{child_path, impl_construct, RemovalPolicy};
use crate::error::Result;
use crate::stack::Stack;
use crate::template::{Resource, Value};

/// How long log events are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetentionDays {
    /// 1 day
    OneDay,
    /// 3 days
    ThreeDays,
    /// 5 days
    FiveDays,
    /// 7 days
    OneWeek,
    /// 14 days
    TwoWeeks,
    /// 30 days
    OneMonth,
    /// 90 days
    ThreeMonths,
    /// 180 days
    SixMonths,
    /// 365 days
    OneYear,
    /// Never expire
    #[default]
    Infinite,
}

impl RetentionDays {
    /// Retention in days, or `None` for infinite.
    pub fn days(self) -> Option<u32> {
        match self {
            RetentionDays::OneDay => Some(1),
            RetentionDays::ThreeDays => Some(3),
            RetentionDays::FiveDays => Some(5),
            RetentionDays::OneWeek => Some(7),
            RetentionDays::TwoWeeks => Some(14),
            RetentionDays::OneMonth => Some(30),
            RetentionDays::ThreeMonths => Some(90),
            RetentionDays::SixMonths => Some(180),
            RetentionDays::OneYear => Some(365),
            RetentionDays::Infinite => None,
        }
    }
}

/// Properties for [`LogGroup`].
#[derive(Debug, Clone, Default)]
pub struct LogGroupProps {
    /// Retention period
    pub retention: RetentionDays,
    /// Removal policy; log groups are kept by default
    pub removal_policy: RemovalPolicy,
}

/// A log group.
#[derive(Debug, Clone)]
pub struct LogGroup {
    path: Vec<String>,
    logical_id: String,
}

impl_construct!(LogGroup);

impl LogGroup {
    /// Declare a log group nested under `scope`.
    pub fn within(
        stack: &mut Stack,
        scope: &[String],
        id: &str,
        props: LogGroupProps,
    ) -> Result<Self> {
        let path = child_path(scope, &[id]);
        let mut resource = Resource::new("AWS::Logs::LogGroup")
            .with_removal_policy(props.removal_policy.deletion_policy());
        if let Some(days) = props.retention.days() {
            resource = resource.with_property("RetentionInDays", json!(days));
        }
        let logical_id = stack.add_resource(&child_path(&path, &["Resource"]), resource)?;
        Ok(Self { path, logical_id })
    }

    /// `Ref` (the log group name)
    pub fn reference(&self) -> Value {
        Value::reference(&self.logical_id)
    }

    /// `Fn::GetAtt Arn`
    pub fn arn(&self) -> Value {
        Value::get_att(&self.logical_id, "Arn")
    }

    /// Allow `role` to create streams and put events.
    pub fn grant_write(&self, stack: &mut Stack, role: &Role) -> Result<bool> {
        iam::grant(
            stack,
            role,
            GrantKind::LogWrite,
            &self.logical_id,
            vec![PolicyStatement::allow(
                &["logs:CreateLogStream", "logs:PutLogEvents"],
                vec![self.arn()],
            )],
        )
    }
}
