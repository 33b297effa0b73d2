/// Data layer: core types, loading, ordering, aggregation and filtering.
///
/// Architecture:
/// ```text
///  .csv / .json / .parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → MeasurementTable (theme extracted)
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  order    │  analyst permutation → OrderedTable (audience rank column)
///   └──────────┘
///        │
///        ▼
///   ┌───────────┐
///   │ aggregate  │  (timestep_type, theme) → AggregatedTable
///   └───────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  predicate chain → rows for one chart
///   └──────────┘
/// ```

pub mod aggregate;
pub mod filter;
pub mod loader;
pub mod model;
pub mod order;
pub mod theme;
