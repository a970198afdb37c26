pub mod purge_sent;
pub mod queue_status;
pub mod requeue_failed;
