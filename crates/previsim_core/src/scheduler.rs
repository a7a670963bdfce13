//! Time-evolution scheduler
//!
//! `AtMonth(n) → [update NAVs] → [drain queue] → AtMonth(n+1)`, nothing
//! else. Each month is processed fully before the next begins, so a
//! request submitted during month n+1 can never be seen by month n's
//! drain. The drain runs in a single global FIFO by `(created_date, id)`,
//! not grouped by type, because a later request may depend on state an
//! earlier one created in the same batch.
//!
//! The unit of atomicity is one request: each executor runs inside a
//! savepoint, and a failure of any class rolls the store back to exactly
//! where that request found it before the request is marked `failed`.

use crate::date_math::add_months;
use crate::execute;
use crate::lots;
use crate::model::{EngineEvent, MonthLog};
use crate::store::LedgerStore;

/// Advance the simulation by `steps` months. Returns one log per month:
/// the fund NAV deltas followed by one entry per executed or failed
/// request. Callers bound `steps` to a sane range.
pub fn evolve(store: &mut LedgerStore, steps: u32) -> Vec<MonthLog> {
    let mut log = Vec::with_capacity(steps as usize);

    for _ in 0..steps {
        let new_month = store.clock.month + 1;
        let new_date = add_months(store.clock.date, 1);
        // Every executor in this month's batch sees the advanced clock
        store.clock.month = new_month;
        store.clock.date = new_date;

        let mut events = Vec::new();

        // 1. Compound fund NAVs over the cyclic return series
        for fund_id in store.fund_ids_sorted() {
            let Some(fund) = store.fund_mut(fund_id) else {
                continue;
            };
            if let Some((old_nav, new_nav, monthly_return)) = fund.step_nav(new_month) {
                let name = fund.name.clone();
                events.push(EngineEvent::NavUpdated {
                    fund_id,
                    name,
                    old_nav,
                    new_nav,
                    monthly_return,
                });
            }
        }

        // 2. Drain the pending queue, one savepoint per request
        for request_id in store.pending_requests_fifo() {
            let Some(request) = store.request(request_id).cloned() else {
                continue;
            };
            // A portability pair executed earlier in this batch may have
            // already settled this one
            if !request.is_pending() {
                continue;
            }
            // Passive markers wait for their paired out-leg
            if !request.kind.is_executable() {
                continue;
            }

            let savepoint = store.savepoint();
            match execute::execute_request(store, &request) {
                Ok(outcome) => {
                    store.complete_request(request_id, new_date);
                    events.push(outcome.event);
                    // Conservation check: unit supply must match the lots
                    // after every executed request. A rewrite here means
                    // an executor bug and is surfaced, not swallowed.
                    for certificate_id in outcome.touched {
                        let (old_supply, new_supply) = lots::reconcile(store, certificate_id);
                        if (old_supply - new_supply).abs() > lots::RECONCILE_EPS {
                            events.push(EngineEvent::SupplyReconciled {
                                certificate_id,
                                old_supply,
                                new_supply,
                            });
                        }
                    }
                }
                Err(err) => {
                    store.rollback(savepoint);
                    store.fail_request(request_id, err.to_string());
                    events.push(EngineEvent::RequestFailed {
                        request_id,
                        kind: request.kind.label().to_string(),
                        reason: err.to_string(),
                        defect: err.is_defect(),
                    });
                }
            }
        }

        log.push(MonthLog {
            month: new_month,
            date: new_date,
            events,
        });
    }

    log
}
