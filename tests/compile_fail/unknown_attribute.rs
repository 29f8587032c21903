//! Unknown `ktbind` options are rejected.
#![allow(dead_code)]

use ktbind::NativeClass;

#[derive(NativeClass)]
#[ktbind(class = "com.example.Socket", timeout = 5)]
pub struct Socket;

fn main() {}
