//! Small shared utilities

/// Random identifier for connections, update tags, and fencing tokens
pub fn random_id() -> String {
	uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_random_id_unique() {
		assert_ne!(random_id(), random_id());
	}
}

// vim: ts=4
