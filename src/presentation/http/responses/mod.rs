use poem_openapi::Object;

#[derive(Object)]
pub struct QueueStatusDto {
    pub ready: bool,
    pub pending: u64,
    pub sent: u64,
    pub failed: u64,
}
