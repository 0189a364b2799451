//! Canned incidents used by the `simulate` binary and the API tests

use choreo_core::{Category, Incident, Severity};

/// A named, reproducible incident
#[derive(Debug, Clone, Copy)]
pub struct Scenario {
    /// Lookup key
    pub name: &'static str,
    /// Incident title
    pub title: &'static str,
    /// Incident description
    pub message: &'static str,
    /// Severity
    pub severity: Severity,
    /// Category
    pub category: Category,
    /// Tags
    pub tags: &'static [&'static str],
    /// Affected services
    pub services: &'static [&'static str],
}

impl Scenario {
    /// Fresh incident for this scenario, sourced from the simulator
    pub fn incident(&self) -> Incident {
        Incident::new(self.title, self.message, self.severity, self.category)
            .with_source("simulation")
            .with_tags(self.tags.iter().copied())
            .with_services(self.services.iter().copied())
    }
}

/// Every canned scenario, in presentation order
pub static SCENARIOS: [Scenario; 6] = [
    Scenario {
        name: "database_outage",
        title: "Production Database Connection Failures",
        message: "Critical: PostgreSQL primary database showing connection pool exhaustion. \
                  Error rate at 45%. Multiple services reporting database timeouts.",
        severity: Severity::Critical,
        category: Category::Database,
        tags: &["database", "postgresql", "connection-pool", "production"],
        services: &["user-service", "order-service", "payment-service"],
    },
    Scenario {
        name: "api_latency",
        title: "Payment API High Latency Detected",
        message: "Warning: Payment service response time increased to 5.2s (normal: 200ms). \
                  Downstream timeout errors observed.",
        severity: Severity::High,
        category: Category::Performance,
        tags: &["api", "payment", "latency", "performance"],
        services: &["payment-service"],
    },
    Scenario {
        name: "memory_leak",
        title: "Order Service Memory Leak",
        message: "Memory usage of order-service pods increasing steadily. \
                  Current usage at 89% of limit. OOM kill imminent.",
        severity: Severity::High,
        category: Category::Infrastructure,
        tags: &["kubernetes", "memory", "order-service", "oom"],
        services: &["order-service"],
    },
    Scenario {
        name: "security_alert",
        title: "Unusual Login Pattern Detected",
        message: "Security: Multiple failed login attempts from unusual IP ranges. \
                  Possible brute force attack on admin endpoints.",
        severity: Severity::Critical,
        category: Category::Security,
        tags: &["security", "authentication", "brute-force"],
        services: &["auth-service"],
    },
    Scenario {
        name: "deployment_failure",
        title: "Production Deployment Failed - Rollback Required",
        message: "Deployment of v2.4.0 to production failed. Health checks failing on 3/5 pods. \
                  Service degradation detected.",
        severity: Severity::High,
        category: Category::Application,
        tags: &["deployment", "rollback", "health-check", "production"],
        services: &["main-app"],
    },
    Scenario {
        name: "network_issue",
        title: "Inter-Service Communication Failures",
        message: "Network: High packet loss detected between services in kubernetes cluster. \
                  Service mesh reporting connection resets.",
        severity: Severity::Medium,
        category: Category::Network,
        tags: &["network", "kubernetes", "service-mesh", "packet-loss"],
        services: &["user-service", "inventory-service"],
    },
];

/// Look up a scenario by name
pub fn find(name: &str) -> Option<&'static Scenario> {
    SCENARIOS.iter().find(|s| s.name == name)
}

/// Comma-separated scenario names, for usage messages
pub fn names() -> String {
    SCENARIOS.iter().map(|s| s.name).collect::<Vec<_>>().join(", ")
}
