//! SRP6 challenge/proof engine.
//!
//! Implements the legacy game client's SRP6 flavor: `B = (k*v + g^b) mod N`,
//! scrambler `u = SHA1(A | B)`, premaster `S = (A * v^u)^b mod N`, and the
//! 40-byte session key produced by hashing the even and odd bytes of `S`
//! separately and interleaving the digests.
//!
//! Every value crossing this module boundary is a little-endian fixed-width
//! byte array, matching the wire representation: 32-byte keys and salts,
//! 20-byte proofs, a 40-byte session key. Bigint results shorter than their
//! field are zero-padded on the high end.
//!
//! Randomness is injected so callers control the entropy source and tests
//! can script the ephemeral key draw.

use num_bigint::{BigInt, Sign};
use rand::{CryptoRng, RngCore};
use sha1::{Digest, Sha1};
use thiserror::Error;

pub mod primes;

/// Width of public keys, salts and verifiers.
pub const KEY_LENGTH: usize = 32;
/// Width of client/server proofs (a SHA1 digest).
pub const PROOF_LENGTH: usize = 20;
/// Width of the interleaved session key.
pub const SESSION_KEY_LENGTH: usize = 40;

/// A client public key that must not enter the key derivation.
///
/// `A == 0` or `A mod N == 0` would force the premaster secret to zero and
/// let anyone authenticate, so both are rejected before any computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PublicKeyRejected {
    #[error("client public key is zero")]
    Zero,
    #[error("client public key is a multiple of the large safe prime")]
    MultipleOfPrime,
}

/// Why a proof packet failed verification.
#[derive(Debug, Error)]
pub enum ProofFailure {
    #[error(transparent)]
    PublicKey(#[from] PublicKeyRejected),
    #[error("client proof does not match the expected value")]
    Mismatch,
}

/// One in-flight SRP6 exchange, created when the challenge is answered and
/// consumed when the proof arrives.
pub struct SrpExchange {
    username: String,
    salt: [u8; KEY_LENGTH],
    verifier: [u8; KEY_LENGTH],
    server_private_key: [u8; KEY_LENGTH],
    server_public_key: [u8; KEY_LENGTH],
}

/// Output of a successful proof verification.
pub struct ProvenSession {
    pub session_key: [u8; SESSION_KEY_LENGTH],
    pub server_proof: [u8; PROOF_LENGTH],
}

impl SrpExchange {
    /// Draws an ephemeral private key and computes the server public key for
    /// the given account credentials.
    pub fn begin(
        username: &str,
        salt: [u8; KEY_LENGTH],
        verifier: [u8; KEY_LENGTH],
        rng: &mut (impl RngCore + CryptoRng),
    ) -> Self {
        let (server_private_key, server_public_key) = server_challenge(&verifier, rng);
        Self {
            username: username.to_string(),
            salt,
            verifier,
            server_private_key,
            server_public_key,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn salt(&self) -> &[u8; KEY_LENGTH] {
        &self.salt
    }

    pub fn server_public_key(&self) -> &[u8; KEY_LENGTH] {
        &self.server_public_key
    }

    /// Verifies the client's proof. Consumes the exchange either way; a
    /// failed proof discards the ephemeral key material with it.
    pub fn prove(
        self,
        client_public_key: &[u8; KEY_LENGTH],
        client_proof: &[u8; PROOF_LENGTH],
    ) -> Result<ProvenSession, ProofFailure> {
        let session_key = derive_session_key(
            client_public_key,
            &self.server_private_key,
            &self.verifier,
            &self.server_public_key,
        )?;
        let expected = calculate_client_proof(
            &self.username,
            &session_key,
            client_public_key,
            &self.server_public_key,
            &self.salt,
        );
        if expected != *client_proof {
            return Err(ProofFailure::Mismatch);
        }
        Ok(ProvenSession {
            session_key,
            server_proof: calculate_server_proof(client_public_key, client_proof, &session_key),
        })
    }
}

/// Draws a random 32-byte `b` and computes `B = (k*v + g^b) mod N`,
/// redrawing until `B mod N != 0`. Returns `(b, B)`.
pub fn server_challenge(
    verifier: &[u8; KEY_LENGTH],
    rng: &mut (impl RngCore + CryptoRng),
) -> ([u8; KEY_LENGTH], [u8; KEY_LENGTH]) {
    let n = primes::large_safe_prime();
    let g = primes::generator();
    let k = primes::k_value();
    let v = BigInt::from_bytes_le(Sign::Plus, verifier);

    loop {
        let mut private_key = [0u8; KEY_LENGTH];
        rng.fill_bytes(&mut private_key);

        let b = BigInt::from_bytes_le(Sign::Plus, &private_key);
        let public_key = (&k * &v + g.modpow(&b, &n)) % &n;

        // A public key congruent to zero would hand the verifier relation to
        // an eavesdropper; draw again.
        if public_key.sign() == Sign::NoSign {
            continue;
        }

        return (private_key, to_padded_le(&public_key));
    }
}

/// Derives the 40-byte session key from the client's public key.
///
/// Rejects degenerate `A` values before touching the exponentiation.
pub fn derive_session_key(
    client_public_key: &[u8; KEY_LENGTH],
    server_private_key: &[u8; KEY_LENGTH],
    verifier: &[u8; KEY_LENGTH],
    server_public_key: &[u8; KEY_LENGTH],
) -> Result<[u8; SESSION_KEY_LENGTH], PublicKeyRejected> {
    let n = primes::large_safe_prime();
    let a = BigInt::from_bytes_le(Sign::Plus, client_public_key);
    if a.sign() == Sign::NoSign {
        return Err(PublicKeyRejected::Zero);
    }
    if (&a % &n).sign() == Sign::NoSign {
        return Err(PublicKeyRejected::MultipleOfPrime);
    }

    let u = scramble(client_public_key, server_public_key);
    let v = BigInt::from_bytes_le(Sign::Plus, verifier);
    let b = BigInt::from_bytes_le(Sign::Plus, server_private_key);

    // S = (A * v^u)^b % N
    let premaster = (&a * v.modpow(&u, &n)).modpow(&b, &n);

    Ok(interleave(&to_padded_le::<KEY_LENGTH>(&premaster)))
}

/// `M1 = SHA1( (SHA1(N) xor SHA1(g)) | SHA1(U) | s | A | B | K )`.
pub fn calculate_client_proof(
    username: &str,
    session_key: &[u8; SESSION_KEY_LENGTH],
    client_public_key: &[u8; KEY_LENGTH],
    server_public_key: &[u8; KEY_LENGTH],
    salt: &[u8; KEY_LENGTH],
) -> [u8; PROOF_LENGTH] {
    let username_hash = Sha1::digest(username.as_bytes());

    Sha1::new()
        .chain_update(xor_hash())
        .chain_update(username_hash)
        .chain_update(salt)
        .chain_update(client_public_key)
        .chain_update(server_public_key)
        .chain_update(session_key)
        .finalize()
        .into()
}

/// `M2 = SHA1(A | M1 | K)`.
pub fn calculate_server_proof(
    client_public_key: &[u8; KEY_LENGTH],
    client_proof: &[u8; PROOF_LENGTH],
    session_key: &[u8; SESSION_KEY_LENGTH],
) -> [u8; PROOF_LENGTH] {
    Sha1::new()
        .chain_update(client_public_key)
        .chain_update(client_proof)
        .chain_update(session_key)
        .finalize()
        .into()
}

/// Computes the password verifier `v = g^x mod N` with
/// `x = SHA1(s | SHA1(U:P))`. Username and password must already be
/// uppercased the way the client normalizes them.
pub fn calculate_password_verifier(
    username: &str,
    password: &str,
    salt: &[u8; KEY_LENGTH],
) -> [u8; KEY_LENGTH] {
    let credentials = Sha1::new()
        .chain_update(username.as_bytes())
        .chain_update(b":")
        .chain_update(password.as_bytes())
        .finalize();
    let x_hash = Sha1::new().chain_update(salt).chain_update(credentials).finalize();

    let x = BigInt::from_bytes_le(Sign::Plus, &x_hash);
    let v = primes::generator().modpow(&x, &primes::large_safe_prime());

    to_padded_le(&v)
}

/// `u = SHA1(A | B)`, interpreted little-endian.
fn scramble(client_public_key: &[u8; KEY_LENGTH], server_public_key: &[u8; KEY_LENGTH]) -> BigInt {
    let digest = Sha1::new()
        .chain_update(client_public_key)
        .chain_update(server_public_key)
        .finalize();
    BigInt::from_bytes_le(Sign::Plus, &digest)
}

/// Splits `S` into even and odd byte streams, hashes each, and interleaves
/// the digests into the 40-byte session key. Legacy clients drop the two
/// leading bytes when `S` starts with a zero byte.
fn interleave(premaster: &[u8; KEY_LENGTH]) -> [u8; SESSION_KEY_LENGTH] {
    let mut s: &[u8] = premaster;
    if s[0] == 0 {
        s = &s[2..];
    }

    let even: Vec<u8> = s.iter().step_by(2).copied().collect();
    let odd: Vec<u8> = s.iter().skip(1).step_by(2).copied().collect();
    let even_hash = Sha1::digest(&even);
    let odd_hash = Sha1::digest(&odd);

    let mut key = [0u8; SESSION_KEY_LENGTH];
    for (i, (e, o)) in even_hash.iter().zip(odd_hash.iter()).enumerate() {
        key[2 * i] = *e;
        key[2 * i + 1] = *o;
    }
    key
}

/// `SHA1(N) xor SHA1(g)`, the static prefix of the client proof hash.
fn xor_hash() -> [u8; PROOF_LENGTH] {
    let n_hash = Sha1::digest(primes::LARGE_SAFE_PRIME_LE);
    let g_hash = Sha1::digest([primes::GENERATOR]);

    let mut out = [0u8; PROOF_LENGTH];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = n_hash[i] ^ g_hash[i];
    }
    out
}

/// Zero-pads a non-negative bigint into a fixed-width little-endian array.
/// Callers only pass values already reduced modulo `N`, which fit.
fn to_padded_le<const W: usize>(value: &BigInt) -> [u8; W] {
    let (_, bytes) = value.to_bytes_le();
    let mut out = [0u8; W];
    out[..bytes.len()].copy_from_slice(&bytes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Deterministic RNG that hands out pre-scripted 32-byte draws.
    struct ScriptedRng {
        draws: Vec<[u8; KEY_LENGTH]>,
        next: usize,
    }

    impl RngCore for ScriptedRng {
        fn next_u32(&mut self) -> u32 {
            let mut buf = [0u8; 4];
            self.fill_bytes(&mut buf);
            u32::from_le_bytes(buf)
        }

        fn next_u64(&mut self) -> u64 {
            let mut buf = [0u8; 8];
            self.fill_bytes(&mut buf);
            u64::from_le_bytes(buf)
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            let draw = self.draws[self.next];
            self.next += 1;
            dest.copy_from_slice(&draw[..dest.len()]);
        }
    }

    impl CryptoRng for ScriptedRng {}

    /// Independent client-side computation of A, K and M1, following the
    /// client half of the protocol rather than the server equations above.
    fn client_respond(
        username: &str,
        password: &str,
        salt: &[u8; KEY_LENGTH],
        server_public_key: &[u8; KEY_LENGTH],
        client_private_key: &[u8; KEY_LENGTH],
    ) -> ([u8; KEY_LENGTH], [u8; SESSION_KEY_LENGTH], [u8; PROOF_LENGTH]) {
        let n = primes::large_safe_prime();
        let g = primes::generator();
        let k = primes::k_value();

        let credentials = Sha1::new()
            .chain_update(username.as_bytes())
            .chain_update(b":")
            .chain_update(password.as_bytes())
            .finalize();
        let x_hash = Sha1::new().chain_update(salt).chain_update(credentials).finalize();
        let x = BigInt::from_bytes_le(Sign::Plus, &x_hash);

        let a = BigInt::from_bytes_le(Sign::Plus, client_private_key);
        let client_public = g.modpow(&a, &n);
        let client_public_key = to_padded_le::<KEY_LENGTH>(&client_public);

        let u = scramble(&client_public_key, server_public_key);

        // S = (B - k * g^x)^(a + u * x) % N
        let b = BigInt::from_bytes_le(Sign::Plus, server_public_key);
        let base = ((b - k * g.modpow(&x, &n)) % &n + &n) % &n;
        let premaster = base.modpow(&(a + u * x), &n);
        let session_key = interleave(&to_padded_le::<KEY_LENGTH>(&premaster));

        let proof = calculate_client_proof(
            username,
            &session_key,
            &client_public_key,
            server_public_key,
            salt,
        );

        (client_public_key, session_key, proof)
    }

    #[test]
    fn xor_hash_matches_known_value() {
        // SHA1(N) xor SHA1(g) for the fixed group parameters.
        let expected = [
            221, 123, 176, 58, 56, 172, 115, 17, 3, 152, 124, 90, 80, 111, 202, 150, 108, 123, 194,
            167,
        ];
        assert_eq!(xor_hash(), expected);
    }

    #[test]
    fn client_and_server_agree_on_session_key_and_proofs() {
        let username = "ALICE";
        let password = "HUNTER2";
        let salt = [0x5au8; KEY_LENGTH];
        let verifier = calculate_password_verifier(username, password, &salt);

        let mut rng = StdRng::seed_from_u64(1);
        let exchange = SrpExchange::begin(username, salt, verifier, &mut rng);
        let server_public_key = *exchange.server_public_key();

        let client_private_key = [0x21u8; KEY_LENGTH];
        let (client_public_key, client_key, client_proof) = client_respond(
            username,
            password,
            &salt,
            &server_public_key,
            &client_private_key,
        );

        let proven = exchange
            .prove(&client_public_key, &client_proof)
            .expect("proof should verify");
        assert_eq!(proven.session_key, client_key);
        assert_eq!(
            proven.server_proof,
            calculate_server_proof(&client_public_key, &client_proof, &client_key)
        );
    }

    #[test]
    fn wrong_password_is_rejected() {
        let username = "ALICE";
        let salt = [0x11u8; KEY_LENGTH];
        let verifier = calculate_password_verifier(username, "RIGHT", &salt);

        let mut rng = StdRng::seed_from_u64(2);
        let exchange = SrpExchange::begin(username, salt, verifier, &mut rng);
        let server_public_key = *exchange.server_public_key();

        let (client_public_key, _, client_proof) =
            client_respond(username, "WRONG", &salt, &server_public_key, &[0x33u8; 32]);

        assert!(matches!(
            exchange.prove(&client_public_key, &client_proof),
            Err(ProofFailure::Mismatch)
        ));
    }

    #[test]
    fn zero_client_public_key_is_rejected() {
        let err = derive_session_key(
            &[0u8; KEY_LENGTH],
            &[1u8; KEY_LENGTH],
            &[2u8; KEY_LENGTH],
            &[3u8; KEY_LENGTH],
        )
        .unwrap_err();
        assert_eq!(err, PublicKeyRejected::Zero);
    }

    #[test]
    fn client_public_key_equal_to_prime_is_rejected() {
        let err = derive_session_key(
            &primes::LARGE_SAFE_PRIME_LE,
            &[1u8; KEY_LENGTH],
            &[2u8; KEY_LENGTH],
            &[3u8; KEY_LENGTH],
        )
        .unwrap_err();
        assert_eq!(err, PublicKeyRejected::MultipleOfPrime);
    }

    #[test]
    fn degenerate_server_public_key_forces_a_redraw() {
        // Craft a verifier for which the first scripted b produces
        // B = (k*v + g^b) % N == 0: v = -(g^b) * k^-1 mod N. The modular
        // inverse of k exists because N is prime (k^(N-2) mod N).
        let n = primes::large_safe_prime();
        let g = primes::generator();
        let k = primes::k_value();

        let first_draw = [0x42u8; KEY_LENGTH];
        let second_draw = [0x07u8; KEY_LENGTH];

        let b1 = BigInt::from_bytes_le(Sign::Plus, &first_draw);
        let g_pow_b1 = g.modpow(&b1, &n);
        let k_inverse = k.modpow(&(&n - BigInt::from(2u8)), &n);
        let v = ((&n - g_pow_b1) * k_inverse) % &n;
        let verifier = to_padded_le::<KEY_LENGTH>(&v);

        let mut rng = ScriptedRng {
            draws: vec![first_draw, second_draw],
            next: 0,
        };
        let (private_key, public_key) = server_challenge(&verifier, &mut rng);

        // The first draw must have been discarded.
        assert_eq!(rng.next, 2);
        assert_eq!(private_key, second_draw);
        assert_ne!(public_key, [0u8; KEY_LENGTH]);
    }

    #[test]
    fn verifier_is_padded_to_full_width() {
        // A one-byte exponent keeps g^x tiny; the high bytes must be zero.
        let v = to_padded_le::<KEY_LENGTH>(&BigInt::from(49u8));
        assert_eq!(v[0], 49);
        assert!(v[1..].iter().all(|b| *b == 0));
    }

    #[test]
    fn interleave_skips_leading_zero_pair() {
        let mut with_zero = [0xaau8; KEY_LENGTH];
        with_zero[0] = 0;
        let mut trimmed = [0xaau8; KEY_LENGTH];
        trimmed[0] = 0;

        // Hash over bytes 2.. must equal hashing the 30-byte tail directly.
        let tail: Vec<u8> = trimmed[2..].to_vec();
        let even: Vec<u8> = tail.iter().step_by(2).copied().collect();
        let odd: Vec<u8> = tail.iter().skip(1).step_by(2).copied().collect();
        let even_hash = Sha1::digest(&even);
        let odd_hash = Sha1::digest(&odd);

        let key = interleave(&with_zero);
        assert_eq!(key[0], even_hash[0]);
        assert_eq!(key[1], odd_hash[0]);
        assert_eq!(key[38], even_hash[19]);
        assert_eq!(key[39], odd_hash[19]);
    }
}
