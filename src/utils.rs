use rand::Rng;

/// Random identifier attached to a connection's tracing span.
pub fn generate_connection_id() -> String {
    let mut rng = rand::thread_rng();
    format!("{:016x}", rng.gen::<u64>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_connection_id() {
        let id1 = generate_connection_id();
        let id2 = generate_connection_id();
        assert_eq!(id1.len(), 16);
        assert_ne!(id1, id2);
    }
}
