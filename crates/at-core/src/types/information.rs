//! Information (metadata) types.

use std::fmt;

use at_common::{InnerType, Value};
use at_config::ColumnNames;
use at_store::{ColumnHeader, ColumnType};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Role an information type plays in versioning.
///
/// The service roles are each held by exactly one registered type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InformationRole {
    Id,
    Version,
    Timestamp,
    Date,
    IsDeleted,
    Custom,
}

impl InformationRole {
    pub fn is_service(&self) -> bool {
        !matches!(self, InformationRole::Custom)
    }
}

/// Contract for one metadata column.
pub trait InformationPresenter: Send + Sync + 'static {
    /// Code of the information type, also its column name.
    fn code(&self) -> &str;

    fn inner_type(&self) -> InnerType;

    /// Value saved when a record does not carry this information.
    fn default_value(&self) -> Value {
        self.inner_type().default_value()
    }

    fn role(&self) -> InformationRole {
        InformationRole::Custom
    }
}

/// Presenter of the built-in service information.
#[derive(Debug, Clone)]
pub struct ServiceInformation {
    role: InformationRole,
    code: String,
}

impl ServiceInformation {
    pub fn new(role: InformationRole, code: impl Into<String>) -> Self {
        ServiceInformation {
            role,
            code: code.into(),
        }
    }

    /// The five service columns under their configured names.
    pub fn all(columns: &ColumnNames) -> Vec<ServiceInformation> {
        vec![
            ServiceInformation::new(InformationRole::Id, &columns.id),
            ServiceInformation::new(InformationRole::Version, &columns.version),
            ServiceInformation::new(InformationRole::Timestamp, &columns.timestamp),
            ServiceInformation::new(InformationRole::Date, &columns.date),
            ServiceInformation::new(InformationRole::IsDeleted, &columns.is_deleted),
        ]
    }
}

/// Fresh record id: the low 63 bits of a random UUID.
fn generate_id() -> i64 {
    let bits = uuid::Uuid::new_v4().as_u128() as u64;
    (bits & i64::MAX as u64) as i64
}

impl InformationPresenter for ServiceInformation {
    fn code(&self) -> &str {
        &self.code
    }

    fn inner_type(&self) -> InnerType {
        match self.role {
            InformationRole::Id | InformationRole::Timestamp => InnerType::Long,
            InformationRole::Version => InnerType::ULong,
            InformationRole::Date => InnerType::Date,
            InformationRole::IsDeleted => InnerType::Boolean,
            InformationRole::Custom => InnerType::String,
        }
    }

    fn default_value(&self) -> Value {
        match self.role {
            InformationRole::Id => Value::Long(generate_id()),
            InformationRole::Timestamp => Value::Long(Utc::now().timestamp_millis()),
            InformationRole::Date => Value::Date(Utc::now().date_naive()),
            _ => self.inner_type().default_value(),
        }
    }

    fn role(&self) -> InformationRole {
        self.role
    }
}

/// A registered metadata column.
pub struct InformationType {
    code: String,
    inner: InnerType,
    role: InformationRole,
    presenter: Box<dyn InformationPresenter>,
}

impl InformationType {
    pub fn new<P: InformationPresenter>(presenter: P) -> Self {
        InformationType {
            code: presenter.code().to_string(),
            inner: presenter.inner_type(),
            role: presenter.role(),
            presenter: Box::new(presenter),
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn inner_type(&self) -> InnerType {
        self.inner
    }

    pub fn role(&self) -> InformationRole {
        self.role
    }

    pub fn default_value(&self) -> Value {
        self.presenter.default_value()
    }

    pub fn column(&self) -> ColumnHeader {
        ColumnHeader::new(self.code.clone(), ColumnType::scalar(self.inner))
    }
}

impl PartialEq for InformationType {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code && self.inner == other.inner
    }
}

impl Eq for InformationType {}

impl fmt::Debug for InformationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InformationType")
            .field("code", &self.code)
            .field("inner", &self.inner)
            .field("role", &self.role)
            .finish()
    }
}
