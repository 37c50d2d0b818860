#![allow(dead_code)]

pub use clap::{Args, Parser, Subcommand};
pub use log::info;

pub use matrix_util::common_io::{mkdir, open_buf_writer, write_lines};
pub use matrix_util::traits::IoOps;

use std::io::Write;

pub type Mat = nalgebra::DMatrix<f64>;
pub type DVec = nalgebra::DVector<f64>;

/// Write any serializable value as pretty JSON
pub fn write_json<T: serde::Serialize>(value: &T, file: &str) -> anyhow::Result<()> {
    let mut buf = open_buf_writer(file)?;
    serde_json::to_writer_pretty(&mut buf, value)?;
    writeln!(buf)?;
    buf.flush()?;
    Ok(())
}
