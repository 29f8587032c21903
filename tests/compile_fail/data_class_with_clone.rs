//! Data classes are always copied and take no `clone` option.
#![allow(dead_code)]

use ktbind::DataClass;

#[derive(Default, DataClass)]
#[ktbind(class = "com.example.Data", clone)]
pub struct Data {
    pub i: i32,
}

fn main() {}
