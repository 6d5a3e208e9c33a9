use rand::distributions::Alphanumeric;
use rand::Rng;

pub const WEBHOOK_ID_LEN: usize = 13;

/// Draw a 13 character alphanumeric id, retrying while `exists` reports a
/// collision.
pub fn generate_webhook_id(exists: impl Fn(&str) -> bool) -> String {
    generate_with(&mut rand::thread_rng(), exists)
}

pub fn generate_with<R: Rng + ?Sized>(rng: &mut R, exists: impl Fn(&str) -> bool) -> String {
    loop {
        let candidate: String = (0..WEBHOOK_ID_LEN)
            .map(|_| char::from(rng.sample(Alphanumeric)))
            .collect();
        if !exists(&candidate) {
            return candidate;
        }
    }
}
