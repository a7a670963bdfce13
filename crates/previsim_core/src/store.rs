//! In-memory ledger store
//!
//! The engine's single source of truth: funds, certificates, lots,
//! holdings, target allocations, brokerage cash, requests, audit rows, and
//! the simulation clock. A real deployment would back this with a durable
//! row store; the engine only ever touches the operations exposed here.
//!
//! The store is the unit of atomicity. `savepoint()` captures the whole
//! state; the scheduler rolls back to it when a request executor fails,
//! so one bad request can never leak partial mutations into the batch.

use jiff::civil::Date;
use rustc_hash::FxHashMap;

use crate::error::UserError;
use crate::model::{
    AllocationSet, Certificate, CertificateId, EngineConfig, Fund, FundId, Lot, LotAllocation,
    LotId, LotSource, PlanType, Request, RequestId, RequestKind, RequestStatus, UserId,
    WithdrawalRecord,
};

/// Holdings below this are treated as dust and deleted.
pub const HOLDING_DUST_EPS: f64 = 1e-9;

/// The global simulation clock: a month counter and its calendar date,
/// advanced only by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimClock {
    pub month: u32,
    pub date: Date,
}

impl Default for SimClock {
    fn default() -> Self {
        Self {
            month: 0,
            date: jiff::civil::date(2026, 1, 1),
        }
    }
}

/// Whole-store snapshot used for per-request rollback.
#[derive(Debug)]
pub struct Savepoint(Box<LedgerStore>);

#[derive(Debug, Clone)]
pub struct LedgerStore {
    pub config: EngineConfig,
    pub clock: SimClock,
    funds: FxHashMap<FundId, Fund>,
    certificates: FxHashMap<CertificateId, Certificate>,
    lots: FxHashMap<CertificateId, Vec<Lot>>,
    holdings: FxHashMap<CertificateId, FxHashMap<FundId, f64>>,
    allocations: FxHashMap<CertificateId, AllocationSet>,
    brokerage_cash: FxHashMap<UserId, f64>,
    requests: Vec<Request>,
    /// Declared non-deductible contributions at other issuers, per
    /// (user, calendar year); part of the excise-tax base.
    declared_external: FxHashMap<(UserId, i16), f64>,
    lot_allocations: Vec<LotAllocation>,
    withdrawal_records: Vec<WithdrawalRecord>,
    next_certificate_id: u32,
    next_lot_id: u32,
    next_request_id: u32,
}

impl LedgerStore {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            clock: SimClock::default(),
            funds: FxHashMap::default(),
            certificates: FxHashMap::default(),
            lots: FxHashMap::default(),
            holdings: FxHashMap::default(),
            allocations: FxHashMap::default(),
            brokerage_cash: FxHashMap::default(),
            requests: Vec::new(),
            declared_external: FxHashMap::default(),
            lot_allocations: Vec::new(),
            withdrawal_records: Vec::new(),
            next_certificate_id: 1,
            next_lot_id: 1,
            next_request_id: 1,
        }
    }

    // ========================================================================
    // Savepoints
    // ========================================================================

    /// Begin a per-request transaction scope. Dropping the savepoint
    /// commits; `rollback` restores the captured state exactly.
    pub fn savepoint(&self) -> Savepoint {
        Savepoint(Box::new(self.clone()))
    }

    pub fn rollback(&mut self, savepoint: Savepoint) {
        *self = *savepoint.0;
    }

    // ========================================================================
    // Funds
    // ========================================================================

    pub fn insert_fund(&mut self, fund: Fund) {
        self.funds.insert(fund.fund_id, fund);
    }

    pub fn fund(&self, fund_id: FundId) -> Option<&Fund> {
        self.funds.get(&fund_id)
    }

    pub fn fund_mut(&mut self, fund_id: FundId) -> Option<&mut Fund> {
        self.funds.get_mut(&fund_id)
    }

    /// Fund ids in ascending order, for deterministic NAV-update logs.
    pub fn fund_ids_sorted(&self) -> Vec<FundId> {
        let mut ids: Vec<FundId> = self.funds.keys().copied().collect();
        ids.sort();
        ids
    }

    // ========================================================================
    // Certificates
    // ========================================================================

    pub fn create_certificate(
        &mut self,
        user_id: UserId,
        plan_type: PlanType,
        created_date: Date,
    ) -> CertificateId {
        let certificate_id = CertificateId(self.next_certificate_id);
        self.next_certificate_id += 1;
        self.certificates.insert(
            certificate_id,
            Certificate::new(certificate_id, user_id, plan_type, created_date),
        );
        certificate_id
    }

    pub fn insert_certificate(&mut self, certificate: Certificate) {
        self.next_certificate_id = self.next_certificate_id.max(certificate.certificate_id.0 + 1);
        self.certificates
            .insert(certificate.certificate_id, certificate);
    }

    pub fn certificate(&self, certificate_id: CertificateId) -> Option<&Certificate> {
        self.certificates.get(&certificate_id)
    }

    pub fn certificate_mut(&mut self, certificate_id: CertificateId) -> Option<&mut Certificate> {
        self.certificates.get_mut(&certificate_id)
    }

    pub fn certificate_ids_for_user(&self, user_id: UserId) -> Vec<CertificateId> {
        let mut ids: Vec<CertificateId> = self
            .certificates
            .values()
            .filter(|c| c.user_id == user_id)
            .map(|c| c.certificate_id)
            .collect();
        ids.sort();
        ids
    }

    /// Admin cascade delete: the certificate, its lots, holdings, target
    /// allocation, and requests all go.
    pub fn delete_certificate(&mut self, certificate_id: CertificateId) {
        self.certificates.remove(&certificate_id);
        self.lots.remove(&certificate_id);
        self.holdings.remove(&certificate_id);
        self.allocations.remove(&certificate_id);
        self.requests
            .retain(|r| r.certificate_id != Some(certificate_id));
    }

    /// Bump the cached unit supply, snapping sub-epsilon residue to zero.
    pub fn update_unit_supply(&mut self, certificate_id: CertificateId, delta: f64) {
        if let Some(cert) = self.certificates.get_mut(&certificate_id) {
            cert.unit_supply += delta;
            if cert.unit_supply < HOLDING_DUST_EPS {
                cert.unit_supply = 0.0;
            }
        }
    }

    /// Bump the VGBL premium remaining, clamped at zero.
    pub fn update_premium_remaining(&mut self, certificate_id: CertificateId, delta: f64) {
        if let Some(cert) = self.certificates.get_mut(&certificate_id) {
            cert.premium_remaining = (cert.premium_remaining + delta).max(0.0);
        }
    }

    // ========================================================================
    // Lots
    // ========================================================================

    /// Append a lot, assigning its id. Callers go through
    /// `lots::issue_lot` so unit supply stays in step.
    pub(crate) fn push_lot(&mut self, mut lot: Lot) -> LotId {
        let lot_id = LotId(self.next_lot_id);
        self.next_lot_id += 1;
        lot.lot_id = lot_id;
        self.lots.entry(lot.certificate_id).or_default().push(lot);
        lot_id
    }

    /// Lots of a certificate in FIFO order: `(date, lot_id)` ascending.
    pub fn lots_fifo(&self, certificate_id: CertificateId) -> Vec<Lot> {
        let mut lots: Vec<Lot> = self
            .lots
            .get(&certificate_id)
            .map(|v| v.to_vec())
            .unwrap_or_default();
        lots.sort_by_key(|l| (l.date, l.lot_id));
        lots
    }

    pub fn lot_mut(&mut self, certificate_id: CertificateId, lot_id: LotId) -> Option<&mut Lot> {
        self.lots
            .get_mut(&certificate_id)?
            .iter_mut()
            .find(|l| l.lot_id == lot_id)
    }

    /// Net amounts of this-year direct contributions across the user's
    /// certificates of the given plan type: the stored side of the
    /// excise-tax base. Transfers and portabilities are exempt.
    pub fn contributions_in_year(&self, user_id: UserId, plan_type: PlanType, year: i16) -> f64 {
        self.certificates
            .values()
            .filter(|c| c.user_id == user_id && c.plan_type == plan_type)
            .flat_map(|c| self.lots.get(&c.certificate_id).into_iter().flatten())
            .filter(|l| l.source == LotSource::Contribution && l.date.year() == year)
            .map(|l| l.net_amount)
            .sum()
    }

    // ========================================================================
    // Holdings
    // ========================================================================

    /// Holdings of a certificate as `(fund, units)` sorted by fund id.
    pub fn holdings(&self, certificate_id: CertificateId) -> Vec<(FundId, f64)> {
        let mut entries: Vec<(FundId, f64)> = self
            .holdings
            .get(&certificate_id)
            .map(|m| m.iter().map(|(k, v)| (*k, *v)).collect())
            .unwrap_or_default();
        entries.sort_by_key(|(fund_id, _)| *fund_id);
        entries
    }

    pub fn holding_units(&self, certificate_id: CertificateId, fund_id: FundId) -> f64 {
        self.holdings
            .get(&certificate_id)
            .and_then(|m| m.get(&fund_id))
            .copied()
            .unwrap_or(0.0)
    }

    /// Upsert a holding; sub-dust positions are deleted outright.
    pub fn set_holding(&mut self, certificate_id: CertificateId, fund_id: FundId, units: f64) {
        if units <= HOLDING_DUST_EPS {
            if let Some(m) = self.holdings.get_mut(&certificate_id) {
                m.remove(&fund_id);
                if m.is_empty() {
                    self.holdings.remove(&certificate_id);
                }
            }
        } else {
            self.holdings
                .entry(certificate_id)
                .or_default()
                .insert(fund_id, units);
        }
    }

    // ========================================================================
    // Target allocations
    // ========================================================================

    pub fn allocation(&self, certificate_id: CertificateId) -> Option<&AllocationSet> {
        self.allocations.get(&certificate_id)
    }

    /// Validation happened when the `AllocationSet` was constructed, so
    /// storing is unconditional.
    pub fn set_allocation(&mut self, certificate_id: CertificateId, allocation: AllocationSet) {
        self.allocations.insert(certificate_id, allocation);
    }

    // ========================================================================
    // Brokerage cash
    // ========================================================================

    /// Reads as zero until first credited.
    pub fn brokerage_cash(&self, user_id: UserId) -> f64 {
        self.brokerage_cash.get(&user_id).copied().unwrap_or(0.0)
    }

    pub fn set_brokerage_cash(&mut self, user_id: UserId, amount: f64) {
        self.brokerage_cash.insert(user_id, amount);
    }

    pub fn add_brokerage_cash(&mut self, user_id: UserId, delta: f64) {
        let current = self.brokerage_cash(user_id);
        self.set_brokerage_cash(user_id, current + delta);
    }

    // ========================================================================
    // Requests
    // ========================================================================

    pub fn submit_request(
        &mut self,
        user_id: UserId,
        certificate_id: Option<CertificateId>,
        kind: RequestKind,
    ) -> RequestId {
        let request_id = RequestId(self.next_request_id);
        self.next_request_id += 1;
        self.requests.push(Request {
            request_id,
            user_id,
            certificate_id,
            kind,
            status: RequestStatus::Pending,
            created_date: self.clock.date,
            completed_date: None,
            status_reason: None,
        });
        request_id
    }

    pub fn request(&self, request_id: RequestId) -> Option<&Request> {
        self.requests.iter().find(|r| r.request_id == request_id)
    }

    pub fn requests(&self) -> &[Request] {
        &self.requests
    }

    /// Pending request ids in global FIFO order: `(created_date, id)`.
    pub fn pending_requests_fifo(&self) -> Vec<RequestId> {
        let mut pending: Vec<&Request> =
            self.requests.iter().filter(|r| r.is_pending()).collect();
        pending.sort_by_key(|r| (r.created_date, r.request_id));
        pending.iter().map(|r| r.request_id).collect()
    }

    /// Pending `PortabilityIn` markers on `destination` that name `source`.
    pub fn pending_portability_in_matching(
        &self,
        destination: CertificateId,
        source: CertificateId,
    ) -> Vec<RequestId> {
        self.requests
            .iter()
            .filter(|r| {
                r.is_pending()
                    && r.certificate_id == Some(destination)
                    && matches!(r.kind, RequestKind::PortabilityIn { source: s } if s == source)
            })
            .map(|r| r.request_id)
            .collect()
    }

    pub(crate) fn complete_request(&mut self, request_id: RequestId, completed_date: Date) {
        if let Some(r) = self.request_entry_mut(request_id) {
            r.status = RequestStatus::Completed;
            r.completed_date = Some(completed_date);
        }
    }

    pub(crate) fn fail_request(&mut self, request_id: RequestId, reason: String) {
        if let Some(r) = self.request_entry_mut(request_id) {
            r.status = RequestStatus::Failed;
            r.status_reason = Some(reason);
        }
    }

    /// Admin rejection; valid only while pending.
    pub fn reject_request(
        &mut self,
        request_id: RequestId,
        reason: Option<String>,
    ) -> Result<(), UserError> {
        let r = self
            .request_entry_mut(request_id)
            .ok_or(UserError::RequestNotPending(request_id))?;
        if !r.is_pending() {
            return Err(UserError::RequestNotPending(request_id));
        }
        r.status = RequestStatus::Rejected;
        r.status_reason = reason;
        Ok(())
    }

    /// Owner cancellation; valid only while pending.
    pub fn cancel_request(&mut self, request_id: RequestId) -> Result<(), UserError> {
        let r = self
            .request_entry_mut(request_id)
            .ok_or(UserError::RequestNotPending(request_id))?;
        if !r.is_pending() {
            return Err(UserError::RequestNotPending(request_id));
        }
        r.status = RequestStatus::Cancelled;
        Ok(())
    }

    fn request_entry_mut(&mut self, request_id: RequestId) -> Option<&mut Request> {
        self.requests.iter_mut().find(|r| r.request_id == request_id)
    }

    // ========================================================================
    // Excise declarations
    // ========================================================================

    pub fn declared_external(&self, user_id: UserId, year: i16) -> f64 {
        self.declared_external
            .get(&(user_id, year))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn set_declared_external(&mut self, user_id: UserId, year: i16, amount: f64) {
        self.declared_external.insert((user_id, year), amount);
    }

    // ========================================================================
    // Audit rows (write-only from the engine's perspective)
    // ========================================================================

    pub(crate) fn push_lot_allocation(&mut self, row: LotAllocation) {
        self.lot_allocations.push(row);
    }

    pub fn lot_allocations(&self) -> &[LotAllocation] {
        &self.lot_allocations
    }

    pub(crate) fn push_withdrawal_record(&mut self, row: WithdrawalRecord) {
        self.withdrawal_records.push(row);
    }

    pub fn withdrawal_records(&self) -> &[WithdrawalRecord] {
        &self.withdrawal_records
    }
}

impl Default for LedgerStore {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TaxRegime;

    #[test]
    fn test_savepoint_rollback_restores_everything() {
        let mut store = LedgerStore::default();
        let user = UserId(1);
        store.set_brokerage_cash(user, 500.0);
        let cert = store.create_certificate(user, PlanType::Vgbl, store.clock.date);

        let savepoint = store.savepoint();
        store.set_brokerage_cash(user, 0.0);
        store.update_premium_remaining(cert, 123.0);
        store.certificate_mut(cert).unwrap().tax_regime = Some(TaxRegime::Regressive);

        store.rollback(savepoint);
        assert_eq!(store.brokerage_cash(user), 500.0);
        let cert = store.certificate(cert).unwrap();
        assert_eq!(cert.premium_remaining, 0.0);
        assert_eq!(cert.tax_regime, None);
    }

    #[test]
    fn test_pending_fifo_orders_by_date_then_id() {
        let mut store = LedgerStore::default();
        let user = UserId(1);
        let a = store.submit_request(user, None, RequestKind::BrokerageWithdrawal { amount: 1.0 });
        store.clock.date = jiff::civil::date(2026, 2, 1);
        let b = store.submit_request(user, None, RequestKind::BrokerageWithdrawal { amount: 2.0 });
        // Backdate a third request to before the first
        store.clock.date = jiff::civil::date(2025, 12, 1);
        let c = store.submit_request(user, None, RequestKind::BrokerageWithdrawal { amount: 3.0 });

        assert_eq!(store.pending_requests_fifo(), vec![c, a, b]);
    }

    #[test]
    fn test_cancel_only_from_pending() {
        let mut store = LedgerStore::default();
        let user = UserId(1);
        let id = store.submit_request(user, None, RequestKind::BrokerageWithdrawal { amount: 1.0 });
        store.cancel_request(id).unwrap();
        assert_eq!(store.request(id).unwrap().status, RequestStatus::Cancelled);
        assert_eq!(
            store.cancel_request(id).unwrap_err(),
            UserError::RequestNotPending(id)
        );
        assert_eq!(
            store.reject_request(id, None).unwrap_err(),
            UserError::RequestNotPending(id)
        );
    }

    #[test]
    fn test_dust_holdings_deleted() {
        let mut store = LedgerStore::default();
        let cert = store.create_certificate(UserId(1), PlanType::Pgbl, store.clock.date);
        store.set_holding(cert, FundId(1), 10.0);
        store.set_holding(cert, FundId(1), 1e-12);
        assert!(store.holdings(cert).is_empty());
    }
}
