// src/utils/mod.rs

pub mod blob;
pub mod cookie;
pub mod hash;
pub mod html;
pub mod jwt;
