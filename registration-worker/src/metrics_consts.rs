pub const WORKER_ITEMS: &str = "registration_worker_items_total";
pub const WORKER_SATURATION: &str = "registration_worker_saturation_percent";
