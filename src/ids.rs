//! ids.rs
//!
//! Человекочитаемые идентификаторы вида `E00-001`, `U00-001`, `B00-001`.
//!
//! Номер берётся из сериализованного счётчика (sequence в PostgreSQL или
//! атомарный счётчик в памяти), поэтому два параллельных вызова никогда не
//! получат один и тот же идентификатор.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKind {
    Event,
    User,
    Booking,
}

impl IdKind {
    pub const ALL: [IdKind; 3] = [IdKind::Event, IdKind::User, IdKind::Booking];

    pub const fn tag(self) -> &'static str {
        match self {
            IdKind::Event => "E00-",
            IdKind::User => "U00-",
            IdKind::Booking => "B00-",
        }
    }

    /// Имя sequence в базе данных.
    pub const fn sequence(self) -> &'static str {
        match self {
            IdKind::Event => "event_id_seq",
            IdKind::User => "user_id_seq",
            IdKind::Booking => "booking_id_seq",
        }
    }

    pub const fn entity(self) -> &'static str {
        match self {
            IdKind::Event => "event",
            IdKind::User => "user",
            IdKind::Booking => "booking",
        }
    }

    const fn slot(self) -> usize {
        match self {
            IdKind::Event => 0,
            IdKind::User => 1,
            IdKind::Booking => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdParseError {
    #[error("идентификатор {0:?} должен начинаться с {1}")]
    WrongPrefix(String, &'static str),
    #[error("идентификатор {0:?} содержит нечисловой суффикс")]
    NotNumeric(String),
    #[error("идентификатор {0:?} имеет нулевой номер")]
    Zero(String),
    #[error("идентификатор {0:?} записан не в каноническом виде, ожидается {1}")]
    NonCanonical(String, String),
}

/// Номер дополняется нулями до трёх знаков, но не обрезается: `E00-1000`.
pub fn format_id(kind: IdKind, number: u64) -> String {
    format!("{}{:03}", kind.tag(), number)
}

pub fn parse_id(kind: IdKind, id: &str) -> Result<u64, IdParseError> {
    let digits = id
        .strip_prefix(kind.tag())
        .ok_or_else(|| IdParseError::WrongPrefix(id.to_string(), kind.tag()))?;

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(IdParseError::NotNumeric(id.to_string()));
    }

    let number: u64 = digits
        .parse()
        .map_err(|_| IdParseError::NotNumeric(id.to_string()))?;

    if number == 0 {
        return Err(IdParseError::Zero(id.to_string()));
    }

    // `E00-01` и `E00-0001` не должны указывать на `E00-001`
    let canonical = format_id(kind, number);
    if canonical != id {
        return Err(IdParseError::NonCanonical(id.to_string(), canonical));
    }
    Ok(number)
}

/// Проверка идентификатора, пришедшего от клиента.
pub fn validate_id(kind: IdKind, id: &str) -> Result<u64, AppError> {
    parse_id(kind, id).map_err(|e| AppError::InvalidArgument(e.to_string()))
}

/// Атомарные счётчики для in-memory хранилища.
#[derive(Debug, Default)]
pub struct SequenceAllocator {
    counters: [AtomicU64; 3],
}

impl SequenceAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_number(&self, kind: IdKind) -> u64 {
        self.counters[kind.slot()].fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn next_id(&self, kind: IdKind) -> String {
        format_id(kind, self.next_number(kind))
    }

    /// Продолжить нумерацию после уже сохранённых записей.
    ///
    /// Битый идентификатор в хранилище - фатальная ошибка, такие записи не пропускаются.
    pub fn resume<'a, I>(&self, kind: IdKind, stored: I) -> Result<(), AppError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut max = 0;
        for id in stored {
            let number = parse_id(kind, id)
                .map_err(|e| AppError::AllocationFailure(e.to_string()))?;
            max = max.max(number);
        }
        self.counters[kind.slot()].fetch_max(max, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn first_ids_are_one_based_and_padded() {
        let alloc = SequenceAllocator::new();
        assert_eq!(alloc.next_id(IdKind::Event), "E00-001");
        assert_eq!(alloc.next_id(IdKind::Event), "E00-002");
        assert_eq!(alloc.next_id(IdKind::User), "U00-001");
        assert_eq!(alloc.next_id(IdKind::Booking), "B00-001");
    }

    #[test]
    fn padding_boundaries() {
        assert_eq!(format_id(IdKind::Event, 9), "E00-009");
        assert_eq!(format_id(IdKind::Event, 10), "E00-010");
        assert_eq!(format_id(IdKind::Event, 100), "E00-100");
        assert_eq!(format_id(IdKind::Event, 1000), "E00-1000");
    }

    #[test]
    fn sequential_allocation_hits_every_boundary() {
        let alloc = SequenceAllocator::new();
        let ids: Vec<String> = (0..1000).map(|_| alloc.next_id(IdKind::Booking)).collect();
        assert_eq!(ids[9], "B00-010");
        assert_eq!(ids[99], "B00-100");
        assert_eq!(ids[999], "B00-1000");
    }

    #[test]
    fn parse_rejects_malformed_ids() {
        assert!(matches!(parse_id(IdKind::Event, "U00-001"), Err(IdParseError::WrongPrefix(..))));
        assert!(matches!(parse_id(IdKind::Event, "E00-"), Err(IdParseError::NotNumeric(_))));
        assert!(matches!(parse_id(IdKind::Event, "E00-12a"), Err(IdParseError::NotNumeric(_))));
        assert!(matches!(parse_id(IdKind::Event, "E00-+12"), Err(IdParseError::NotNumeric(_))));
        assert!(matches!(parse_id(IdKind::Event, "E00-000"), Err(IdParseError::Zero(_))));
        assert_eq!(parse_id(IdKind::Event, "E00-042"), Ok(42));
    }

    #[test]
    fn parse_rejects_extra_or_missing_zero_padding() {
        for id in ["E00-1", "E00-01", "E00-0001", "E00-01000"] {
            assert!(
                matches!(parse_id(IdKind::Event, id), Err(IdParseError::NonCanonical(..))),
                "{id} accepted"
            );
        }
        assert_eq!(parse_id(IdKind::Event, "E00-001"), Ok(1));
        assert_eq!(parse_id(IdKind::Event, "E00-1000"), Ok(1000));
        assert_eq!(validate_id(IdKind::Event, "E00-0001").unwrap_err().code(), "INVALID_ARGUMENT");
    }

    #[test]
    fn resume_continues_after_highest_stored_id() {
        let alloc = SequenceAllocator::new();
        alloc
            .resume(IdKind::Event, ["E00-003", "E00-1000", "E00-099"])
            .unwrap();
        assert_eq!(alloc.next_id(IdKind::Event), "E00-1001");
    }

    #[test]
    fn resume_fails_on_corrupt_stored_id() {
        let alloc = SequenceAllocator::new();
        let err = alloc.resume(IdKind::User, ["U00-001", "U00-xyz"]).unwrap_err();
        assert_eq!(err.code(), "ALLOCATION_FAILURE");
        // счётчик не сдвинулся
        assert_eq!(alloc.next_id(IdKind::User), "U00-001");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_allocation_never_duplicates() {
        let alloc = Arc::new(SequenceAllocator::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let alloc = alloc.clone();
                tokio::spawn(async move {
                    (0..250).map(|_| alloc.next_id(IdKind::Event)).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for ids in futures::future::join_all(handles).await {
            for id in ids.unwrap() {
                assert!(seen.insert(id), "duplicate id allocated");
            }
        }
        assert_eq!(seen.len(), 16 * 250);
        assert!(seen.contains("E00-4000"));
    }

    proptest! {
        #[test]
        fn format_then_parse_preserves_number(n in 1u64..10_000_000) {
            for kind in IdKind::ALL {
                let id = format_id(kind, n);
                prop_assert!(id.len() >= kind.tag().len() + 3);
                prop_assert_eq!(parse_id(kind, &id), Ok(n));
            }
        }

        #[test]
        fn numeric_order_is_preserved(a in 1u64..100_000, b in 1u64..100_000) {
            let (ia, ib) = (format_id(IdKind::Event, a), format_id(IdKind::Event, b));
            let by_id = (ia.len(), ia.as_str()).cmp(&(ib.len(), ib.as_str()));
            prop_assert_eq!(by_id, a.cmp(&b));
        }
    }
}
