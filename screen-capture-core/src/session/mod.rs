pub mod capture;
pub mod router;
pub mod shutdown;

#[cfg(test)]
pub(crate) mod test_support;
