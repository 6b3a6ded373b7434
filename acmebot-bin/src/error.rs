pub use anyhow::{anyhow, ensure, Context};
