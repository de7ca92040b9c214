//! Extrinsic list: the concrete wiring of the generic engine to the
//! capability router, ordered newest-first by (block, index).

use crate::list::{PageFetchFn, PaginatedList, SubscribeFn};
use crate::router::CapabilityRouter;
use crate::types::{Capability, Extrinsic, ExtrinsicFilter};
use std::cmp::Ordering;

/// Newest first; ties on the block broken by the index within the block, so
/// `Equal` holds exactly for the same logical extrinsic.
pub fn compare_extrinsics(a: &Extrinsic, b: &Extrinsic) -> Ordering {
    b.block_number
        .cmp(&a.block_number)
        .then(b.extrinsic_idx.cmp(&a.extrinsic_idx))
}

pub fn same_extrinsic(a: &Extrinsic, b: &Extrinsic) -> bool {
    a.id() == b.id()
}

pub type ExtrinsicList = PaginatedList<Extrinsic, ExtrinsicFilter>;

/// Build an extrinsic list whose history and live feed both go through
/// `capability` on whatever network is currently active.
///
/// The list resets itself on every network switch; items from the previous
/// network never survive an activation. Must be called within a Tokio
/// runtime.
pub fn extrinsic_list(router: CapabilityRouter, capability: Capability) -> ExtrinsicList {
    let network_changes = router.network_watch();
    let fetch_router = router.clone();
    let fetch_page: PageFetchFn<Extrinsic, ExtrinsicFilter> =
        Box::new(move |filter, page_size, page_key| {
            let router = fetch_router.clone();
            Box::pin(async move {
                router
                    .fetch_extrinsics(capability, &filter, page_size, page_key)
                    .await
            })
        });

    let subscribe: SubscribeFn<Extrinsic, ExtrinsicFilter> = Box::new(move |filter, sink| {
        let router = router.clone();
        Box::pin(async move {
            router
                .subscribe_new_extrinsics(capability, &filter, sink)
                .await
        })
    });

    let list = PaginatedList::new(fetch_page, subscribe, compare_extrinsics, same_extrinsic);
    list.reset_on(network_changes);
    list
}
