//! A data class must name its managed class.
#![allow(dead_code)]

use ktbind::DataClass;

#[derive(Default, DataClass)]
pub struct Point {
    pub x: f64,
}

fn main() {}
