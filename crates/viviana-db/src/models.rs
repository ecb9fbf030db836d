/// One row of the key-value table. The value stays raw JSON text here;
/// decoding happens in `Store`.
pub struct KvRow {
    pub key: String,
    pub value: String,
    pub updated_at: String,
}
