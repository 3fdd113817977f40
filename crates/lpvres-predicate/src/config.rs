/// Annotation carrying the cpu reserved by a local volume
pub const DEFAULT_RESERVED_CPU_ANNOTATION: &str = "reserved-cpu";

/// Annotation carrying the memory reserved by a local volume
pub const DEFAULT_RESERVED_MEMORY_ANNOTATION: &str = "reserved-mem";

/// Configuration for the predicate engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredicateConfig {
    /// Annotation key declaring reserved cpu on a persistent volume
    pub reserved_cpu_annotation: String,
    /// Annotation key declaring reserved memory on a persistent volume
    pub reserved_memory_annotation: String,
    /// Whether local volumes that are not yet bound take part in matching
    pub consider_unbound_local_pv: bool,
}

impl Default for PredicateConfig {
    fn default() -> Self {
        Self {
            reserved_cpu_annotation: DEFAULT_RESERVED_CPU_ANNOTATION.to_string(),
            reserved_memory_annotation: DEFAULT_RESERVED_MEMORY_ANNOTATION.to_string(),
            consider_unbound_local_pv: true,
        }
    }
}
