metric_enum! {
    pub enum DispatchMetric {
        Transactions => "mcareg_transactions_total",
        Bytes => "mcareg_transfer_bytes_total",
        Errors => "mcareg_errors_total",
        FlashSettles => "mcareg_flash_settles_total",
    }
}

impl DispatchMetric {
    pub fn help(&self) -> &'static str {
        match self {
            DispatchMetric::Transactions => "Commands performed, by direction and command",
            DispatchMetric::Bytes => "Bytes moved over the transport, by endpoint and direction",
            DispatchMetric::Errors => "Failed commands, by error kind",
            DispatchMetric::FlashSettles => "Waits for a non-volatile write to commit",
        }
    }

    pub fn labels(&self) -> &'static [&'static str] {
        match self {
            DispatchMetric::Transactions => &["direction", "command"],
            DispatchMetric::Bytes => &["endpoint", "direction"],
            DispatchMetric::Errors => &["kind"],
            DispatchMetric::FlashSettles => &[],
        }
    }
}
