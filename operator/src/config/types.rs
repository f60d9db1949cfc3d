use envconfig::Envconfig;

#[derive(Envconfig, Clone, Debug)]
pub struct OperatorConfig {
    /// Requeue interval after a reconcile pass that made progress.
    /// Env: GSNAP_REQUEUE_SECS
    #[envconfig(from = "GSNAP_REQUEUE_SECS", default = "30")]
    pub requeue_secs: u64,

    /// Poll interval while the external driver is still assembling the
    /// group (members missing, content unbound, counts not matching).
    /// Env: GSNAP_POLL_SECS
    #[envconfig(from = "GSNAP_POLL_SECS", default = "5")]
    pub poll_secs: u64,

    /// Requeue interval after a failed pass (error_policy).
    /// Env: GSNAP_RETRY_SECS
    #[envconfig(from = "GSNAP_RETRY_SECS", default = "30")]
    pub retry_secs: u64,
}
