use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, IntCounterVec};

pub static CONDITIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "searchable_conditions_total",
        "Search conditions applied by kind",
        &["kind"]
    )
    .unwrap()
});

pub static REJECTED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "searchable_rejected_total",
        "Search calls rejected by reason",
        &["reason"]
    )
    .unwrap()
});
