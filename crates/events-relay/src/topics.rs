//! Event categories accepted by the relay and the topics they land on.

/// Fixed set of event categories. Each maps to one ingestion path and one
/// Kafka topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    Movie,
    User,
    Payment,
}

impl EventCategory {
    pub const ALL: [EventCategory; 3] = [
        EventCategory::Movie,
        EventCategory::User,
        EventCategory::Payment,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventCategory::Movie => "movie",
            EventCategory::User => "user",
            EventCategory::Payment => "payment",
        }
    }

    pub fn topic(self) -> &'static str {
        match self {
            EventCategory::Movie => "movie-events",
            EventCategory::User => "user-events",
            EventCategory::Payment => "payment-events",
        }
    }

    /// Ingestion path, e.g. `/api/events/movie`.
    pub fn path(self) -> &'static str {
        match self {
            EventCategory::Movie => "/api/events/movie",
            EventCategory::User => "/api/events/user",
            EventCategory::Payment => "/api/events/payment",
        }
    }
}

/// Every topic the relay produces to and the diagnostic consumer reads.
pub fn all_topics() -> Vec<&'static str> {
    EventCategory::ALL.iter().map(|c| c.topic()).collect()
}
