//! In-flight load table.
//!
//! Holds at most one load per asset id. A queued load can be claimed either by the
//! worker job that was submitted for it or by a thread blocking on the asset, which
//! then runs it inline. A thread only sleeps on a load that is already running, and
//! only if the wait-for chain (load -> running thread -> load it waits on) does not
//! lead back to itself. Nested loads therefore never deadlock, whatever the pool size.

use std::sync::Arc;
use std::thread::{self, ThreadId};

use ember_core::alloc::HashMap;
use parking_lot::{Condvar, Mutex};

use crate::catalog::AssetCatalog;
use crate::handle::UntypedAsset;
use crate::handler::HandlerSlot;
use crate::id::AssetId;
use crate::settings::AssetFilter;

/// Everything a load needs, captured when it is queued.
pub(crate) struct LoadRequest {
    pub(crate) asset: UntypedAsset,
    pub(crate) handler: Arc<HandlerSlot>,
    pub(crate) catalog: Arc<dyn AssetCatalog>,
    pub(crate) filter: Option<AssetFilter>,
    pub(crate) reload: bool,
}

enum LoadState {
    Queued(LoadRequest),
    Running(ThreadId),
}

struct InFlightLoad {
    ticket: u64,
    state: LoadState,
}

#[derive(Default)]
struct TableInner {
    loads: HashMap<AssetId, InFlightLoad>,
    /// Which load each blocked thread is waiting on.
    waiting: HashMap<ThreadId, AssetId>,
    next_ticket: u64,
}

impl TableInner {
    /// Would `me` waiting on `target` close a cycle in the wait-for graph?
    fn would_deadlock(&self, me: ThreadId, target: AssetId) -> bool {
        let mut current = target;
        for _ in 0..=self.waiting.len() {
            let runner = match self.loads.get(&current).map(|load| &load.state) {
                Some(LoadState::Running(runner)) => *runner,
                _ => return false,
            };
            if runner == me {
                return true;
            }
            match self.waiting.get(&runner) {
                Some(next) => current = *next,
                None => return false,
            }
        }
        true
    }
}

pub(crate) enum WaitOutcome {
    /// The load was still queued; the caller now owns it and must run it.
    Claimed(LoadRequest),
    /// No load is in flight for the id.
    Done,
    /// Waiting would deadlock because this thread is (indirectly) running the load.
    Cycle,
}

#[derive(Default)]
pub(crate) struct InFlightTable {
    inner: Mutex<TableInner>,
    finished: Condvar,
}

impl InFlightTable {
    /// Queue `request` unless a load for `id` is already in flight or `admit` says no.
    ///
    /// `admit` runs under the table lock, so a status change made there is atomic
    /// with the insertion. Returns the ticket the pool job must present to claim it.
    pub(crate) fn enqueue(
        &self,
        id: AssetId,
        admit: impl FnOnce() -> bool,
        request: LoadRequest,
    ) -> Option<u64> {
        let mut inner = self.inner.lock();
        if inner.loads.contains_key(&id) || !admit() {
            return None;
        }
        inner.next_ticket += 1;
        let ticket = inner.next_ticket;
        inner.loads.insert(
            id,
            InFlightLoad {
                ticket,
                state: LoadState::Queued(request),
            },
        );
        Some(ticket)
    }

    /// Claim the queued load for the pool job holding `ticket`.
    ///
    /// Returns `None` if a blocking caller already took it.
    pub(crate) fn claim(&self, id: AssetId, ticket: u64) -> Option<LoadRequest> {
        let mut inner = self.inner.lock();
        let load = inner.loads.get_mut(&id).filter(|load| load.ticket == ticket)?;
        take_if_queued(load, thread::current().id())
    }

    /// Claim the load for `id` if it is still queued, otherwise wait for it to finish.
    pub(crate) fn wait_or_claim(&self, id: AssetId) -> WaitOutcome {
        let me = thread::current().id();
        let mut inner = self.inner.lock();
        loop {
            let Some(load) = inner.loads.get_mut(&id) else {
                return WaitOutcome::Done;
            };
            if let Some(request) = take_if_queued(load, me) {
                return WaitOutcome::Claimed(request);
            }
            if inner.would_deadlock(me, id) {
                return WaitOutcome::Cycle;
            }

            inner.waiting.insert(me, id);
            self.finished.wait(&mut inner);
            inner.waiting.remove(&me);
        }
    }

    /// Remove the load for `id` and wake every waiter.
    pub(crate) fn finish(&self, id: AssetId) {
        self.inner.lock().loads.remove(&id);
        self.finished.notify_all();
    }

    pub(crate) fn contains(&self, id: AssetId) -> bool {
        self.inner.lock().loads.contains_key(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().loads.len()
    }
}

fn take_if_queued(load: &mut InFlightLoad, runner: ThreadId) -> Option<LoadRequest> {
    match std::mem::replace(&mut load.state, LoadState::Running(runner)) {
        LoadState::Queued(request) => Some(request),
        running => {
            load.state = running;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SimpleCatalog;
    use crate::context::LoadContext;
    use crate::data::ErasedPayload;
    use crate::error::AssetResult;
    use crate::handler::{AssetHandler, HandlerRegistry};
    use crate::id::AssetType;
    use crate::io::AssetStream;
    use std::sync::mpsc;
    use std::time::Duration;

    struct Nothing;

    impl AssetHandler for Nothing {
        fn create_asset(&self, _id: AssetId, _asset_type: AssetType) -> Option<ErasedPayload> {
            None
        }

        fn load_asset_data(
            &self,
            _asset: &UntypedAsset,
            _stream: &mut AssetStream,
            _ctx: &LoadContext<'_>,
        ) -> AssetResult<()> {
            Ok(())
        }

        fn handled_asset_types(&self) -> Vec<AssetType> {
            Vec::new()
        }
    }

    fn request() -> LoadRequest {
        let registry = HandlerRegistry::default();
        registry.register_handler(Arc::new(Nothing), AssetType::NIL);
        LoadRequest {
            asset: UntypedAsset::new(),
            handler: registry.handler_for(AssetType::NIL).unwrap(),
            catalog: Arc::new(SimpleCatalog::new()),
            filter: None,
            reload: false,
        }
    }

    const A: AssetId = AssetId::from_u128(0xA, 0);
    const B: AssetId = AssetId::from_u128(0xB, 0);

    #[test]
    fn test_duplicate_enqueue_is_collapsed() {
        let table = InFlightTable::default();
        assert!(table.enqueue(A, || true, request()).is_some());
        assert!(table.enqueue(A, || true, request()).is_none());
        assert!(table.enqueue(B, || false, request()).is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_pool_job_and_waiter_claim_once() {
        let table = InFlightTable::default();
        let ticket = table.enqueue(A, || true, request()).unwrap();

        assert!(matches!(table.wait_or_claim(A), WaitOutcome::Claimed(_)));
        assert!(table.claim(A, ticket).is_none());
        table.finish(A);
        assert!(matches!(table.wait_or_claim(A), WaitOutcome::Done));
        assert!(!table.contains(A));
    }

    #[test]
    fn test_stale_ticket_cannot_claim() {
        let table = InFlightTable::default();
        let ticket = table.enqueue(A, || true, request()).unwrap();
        assert!(table.claim(A, ticket + 1).is_none());
        assert!(table.claim(A, ticket).is_some());
    }

    #[test]
    fn test_waiting_on_own_load_is_a_cycle() {
        let table = InFlightTable::default();
        let ticket = table.enqueue(A, || true, request()).unwrap();
        assert!(table.claim(A, ticket).is_some());
        assert!(matches!(table.wait_or_claim(A), WaitOutcome::Cycle));
    }

    #[test]
    fn test_cross_thread_cycle_is_detected() {
        let table = Arc::new(InFlightTable::default());
        let ticket_a = table.enqueue(A, || true, request()).unwrap();
        let ticket_b = table.enqueue(B, || true, request()).unwrap();

        // This thread runs A; another thread runs B and then waits on A.
        assert!(table.claim(A, ticket_a).is_some());
        let (claimed_tx, claimed_rx) = mpsc::channel();
        let other = {
            let table = Arc::clone(&table);
            std::thread::spawn(move || {
                assert!(table.claim(B, ticket_b).is_some());
                claimed_tx.send(()).unwrap();
                let outcome = table.wait_or_claim(A);
                table.finish(B);
                matches!(outcome, WaitOutcome::Done)
            })
        };
        claimed_rx.recv().unwrap();

        // Give the other thread time to start waiting on A.
        while !table.inner.lock().waiting.values().any(|id| *id == A) {
            std::thread::sleep(Duration::from_millis(1));
        }

        // Waiting on B would close A -> B -> A.
        assert!(matches!(table.wait_or_claim(B), WaitOutcome::Cycle));
        table.finish(A);
        assert!(other.join().unwrap());
    }
}
