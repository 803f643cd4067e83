//! Configuration section definitions.
//!
//! Each module corresponds to a section in `panlive.toml`:
//!
//! | Module     | TOML Section   | Purpose                              |
//! |------------|----------------|--------------------------------------|
//! | `serve`    | `[serve]`      | Ports, home, runtime directory       |
//! | `render`   | `[render]`     | Converter flags, cache, settle delay |
//! | `progress` | `[progress]`   | Progress marker timing               |

mod progress;
mod render;
mod serve;

pub use progress::ProgressConfig;
pub use render::{MathMode, RenderConfig};
pub use serve::ServeConfig;
