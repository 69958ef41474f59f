//! Output generation for the tabular sinks.
//!
//! Every command materializes its full result set in memory first and only
//! then writes the file, so a failed run leaves no partial table behind.
//!
//! # Sinks
//!
//! | Table | Columns | Delimiter |
//! |-------|---------|-----------|
//! | Filtered articles | `Title, Date, Text` | `,` |
//! | Raw articles | `Title, Text` | `,` |
//! | Risk assessment | `date, country, risk, title` | `;` |
//! | Action items | model-chosen | `;` |
//! | Synthetic articles | `Title, Content` | `,` |

pub mod csv;
