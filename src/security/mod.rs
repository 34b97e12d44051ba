mod cipher;
mod token;

pub use cipher::CredentialCipher;
pub use token::{StaticTokenVerifier, TokenVerifier};
