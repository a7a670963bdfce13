use std::fmt;

use crate::model::{CertificateId, FundId, RequestId, UserId};

/// Per-request input failures. These mark the offending request `failed`
/// and leave every other request in the batch untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum UserError {
    /// The request names no certificate but its kind needs one.
    MissingCertificate(RequestId),
    CertificateNotFound(CertificateId),
    UnknownFund(FundId),
    DestinationNotFound(CertificateId),
    OwnershipMismatch {
        certificate_id: CertificateId,
        user_id: UserId,
    },
    NonPositiveAmount(f64),
    InsufficientHoldings {
        certificate_id: CertificateId,
        requested: f64,
        available: f64,
    },
    InsufficientBrokerageCash {
        user_id: UserId,
        requested: f64,
        available: f64,
    },
    MissingTargetAllocation(CertificateId),
    PlanTypeMismatch {
        source: CertificateId,
        destination: CertificateId,
    },
    TaxRegimeMismatch {
        source: CertificateId,
        destination: CertificateId,
    },
    TaxRegimeNotChosen(CertificateId),
    ExciseConsumesContribution {
        amount: f64,
        tax: f64,
    },
    RequestNotExecutable(RequestId),
    RequestNotPending(RequestId),
}

impl fmt::Display for UserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserError::MissingCertificate(id) => {
                write!(f, "request {id:?} does not name a certificate")
            }
            UserError::CertificateNotFound(id) => write!(f, "certificate {id:?} not found"),
            UserError::UnknownFund(id) => write!(f, "fund {id:?} not found"),
            UserError::DestinationNotFound(id) => {
                write!(f, "destination certificate {id:?} not found")
            }
            UserError::OwnershipMismatch {
                certificate_id,
                user_id,
            } => write!(
                f,
                "certificate {certificate_id:?} does not belong to user {user_id:?}"
            ),
            UserError::NonPositiveAmount(amount) => {
                write!(f, "amount must be positive, got {amount}")
            }
            UserError::InsufficientHoldings {
                certificate_id,
                requested,
                available,
            } => write!(
                f,
                "certificate {certificate_id:?} holds {available:.2} but {requested:.2} was requested"
            ),
            UserError::InsufficientBrokerageCash {
                user_id,
                requested,
                available,
            } => write!(
                f,
                "user {user_id:?} has brokerage cash {available:.2} but {requested:.2} was requested"
            ),
            UserError::MissingTargetAllocation(id) => {
                write!(f, "certificate {id:?} has no target allocation")
            }
            UserError::PlanTypeMismatch {
                source,
                destination,
            } => write!(
                f,
                "plan type mismatch between {source:?} and {destination:?}"
            ),
            UserError::TaxRegimeMismatch {
                source,
                destination,
            } => write!(
                f,
                "tax regime mismatch between {source:?} and {destination:?}"
            ),
            UserError::TaxRegimeNotChosen(id) => {
                write!(f, "certificate {id:?} has no tax regime elected")
            }
            UserError::ExciseConsumesContribution { amount, tax } => write!(
                f,
                "excise tax {tax:.2} consumes the entire contribution of {amount:.2}"
            ),
            UserError::RequestNotExecutable(id) => {
                write!(f, "request {id:?} cannot be executed directly")
            }
            UserError::RequestNotPending(id) => {
                write!(f, "request {id:?} is not pending")
            }
        }
    }
}

impl std::error::Error for UserError {}

/// Engine defects. These indicate a broken internal invariant, not bad
/// user input, and must surface distinctly so callers can alert.
#[derive(Debug, Clone, PartialEq)]
pub enum InvariantError {
    /// FIFO consumption was asked for more units than all lots hold.
    InsufficientUnits {
        certificate_id: CertificateId,
        requested: f64,
        available: f64,
    },
    /// A lot would be issued at a non-positive unit price.
    NonPositiveUnitPrice {
        certificate_id: CertificateId,
        unit_price: f64,
    },
    /// A fund referenced by holdings or allocations does not exist.
    FundNotFound(FundId),
}

impl fmt::Display for InvariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvariantError::InsufficientUnits {
                certificate_id,
                requested,
                available,
            } => write!(
                f,
                "invariant violation: certificate {certificate_id:?} lots hold {available} units, {requested} requested"
            ),
            InvariantError::NonPositiveUnitPrice {
                certificate_id,
                unit_price,
            } => write!(
                f,
                "invariant violation: certificate {certificate_id:?} unit price {unit_price} is not positive"
            ),
            InvariantError::FundNotFound(id) => {
                write!(f, "invariant violation: fund {id:?} not found")
            }
        }
    }
}

impl std::error::Error for InvariantError {}

/// Write-boundary validation failures for percentage-shaped configuration
/// (target allocations, port-in schedules). Raised at construction time so
/// invalid tables can never be stored.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    EmptyAllocation,
    PercentageOutOfRange(f64),
    AllocationSumNot100(f64),
    ScheduleSumNot100(f64),
    FractionOutOfRange(f64),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EmptyAllocation => write!(f, "allocation has no entries"),
            ConfigError::PercentageOutOfRange(pct) => {
                write!(f, "percentage {pct} outside (0, 100]")
            }
            ConfigError::AllocationSumNot100(sum) => {
                write!(f, "allocation percentages sum to {sum}, expected 100")
            }
            ConfigError::ScheduleSumNot100(sum) => {
                write!(f, "port-in schedule percentages sum to {sum}, expected 100")
            }
            ConfigError::FractionOutOfRange(frac) => {
                write!(f, "fraction {frac} outside [0, 1]")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Outcome error of a single request executor.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecError {
    User(UserError),
    Invariant(InvariantError),
}

impl ExecError {
    /// True when the failure is an engine defect rather than bad input.
    pub fn is_defect(&self) -> bool {
        matches!(self, ExecError::Invariant(_))
    }
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecError::User(e) => write!(f, "{e}"),
            ExecError::Invariant(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ExecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExecError::User(e) => Some(e),
            ExecError::Invariant(e) => Some(e),
        }
    }
}

impl From<UserError> for ExecError {
    fn from(e: UserError) -> Self {
        ExecError::User(e)
    }
}

impl From<InvariantError> for ExecError {
    fn from(e: InvariantError) -> Self {
        ExecError::Invariant(e)
    }
}
