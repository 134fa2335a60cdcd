mod kv;
mod walks;
