// SPDX-License-Identifier: MIT

pub mod flow;
pub mod server;
pub mod tools;
