pub mod destinations;
pub mod parser;

pub use destinations::{
    is_advisory, DestinationCatalog, DestinationKind, DestinationStats, PayloadShape,
};
pub use parser::{parse, parse_entries, ParseError, StatisticsEntry, StatsMap};
