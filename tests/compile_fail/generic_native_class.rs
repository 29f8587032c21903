//! A native class maps to one managed class and cannot be generic.
#![allow(dead_code)]

use ktbind::NativeClass;

#[derive(NativeClass)]
#[ktbind(class = "com.example.Boxed")]
pub struct Boxed<T>(T);

fn main() {}
