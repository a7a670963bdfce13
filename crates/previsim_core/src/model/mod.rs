mod allocation;
mod audit;
mod certificate;
mod config;
mod fund;
mod ids;
mod lot;
mod month_log;
mod request;

pub use allocation::{ALLOCATION_SUM_TOLERANCE, AllocationSet, TargetAllocation};
pub use audit::{LotAllocation, OutflowKind, WithdrawalRecord};
pub use certificate::{Certificate, Phase, PlanType, TaxRegime};
pub use config::{
    EngineConfig, ExciseTaxConfig, PortInSchedule, PortInTranche, ProgressiveBracket,
    RegressiveBracket, TaxTables,
};
pub use fund::Fund;
pub use ids::{CertificateId, FundId, LotId, RequestId, UserId};
pub use lot::{Lot, LotSource};
pub use month_log::{EngineEvent, MonthLog};
pub use request::{Request, RequestKind, RequestStatus};
