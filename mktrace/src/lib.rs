// SPDX-License-Identifier: GPL-3.0-or-later

pub mod args;
pub mod config;
pub mod context;
pub mod environment;
pub mod modes;
pub mod output;
pub mod pipeline;
pub mod semantic;
pub mod trace;
