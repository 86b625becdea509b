pub const QUEUE_DATA_PROCESSED: &str = "registration_queue_data_processed_total";
pub const QUEUE_DATA_ERRORS: &str = "registration_queue_data_errors_total";
pub const CANDIDATES_RESOLVED: &str = "registration_candidates_resolved_total";
pub const OBSERVATIONS_SAVED: &str = "registration_observations_saved_total";
