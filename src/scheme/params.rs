//! Scheme parameters (§3), their validation, and `HE_CONFIG` JSON loading (§6/§1a).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which HE scheme a [`SchemeParameters`] configures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scheme {
    /// Integer-arithmetic scheme.
    Bfv,
    /// Fixed-point approximate scheme.
    Ckks,
}

const VALID_POLY_MODULUS_DEGREES: [u32; 6] = [1024, 2048, 4096, 8192, 16384, 32768];
const VALID_SECURITY_LEVELS: [u32; 3] = [128, 192, 256];
const VALID_SMALL_MOD_BITS: [u32; 4] = [30, 40, 50, 60];

/// Parameters consumed by a scheme adapter to build a [`super::SchemeContext`].
///
/// Mirrors `original_source/src/seal_parameter.hpp`'s `SEALParameter`, widened
/// to the `{128, 192, 256}` security levels named in the data model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemeParameters {
    /// Which scheme these parameters configure.
    pub scheme: Scheme,
    /// Ring degree N.
    pub poly_modulus_degree: u32,
    /// Bits of security the parameter set targets.
    pub security_level: u32,
    /// BFV-only: the plaintext modulus t.
    pub plain_modulus: Option<u64>,
    /// CKKS-only: bit-widths of the modulus-switching chain's small primes.
    pub coeff_modulus: Vec<u32>,
    /// Quality (decomposition bit count) of the relinearization keys.
    pub evaluation_decomposition_bit_count: u32,
    /// CKKS-only: the fixed-point scale applied at encode time.
    pub scale: f64,
}

impl SchemeParameters {
    /// The hard-coded BFV default: `N=4096, t=2^10, λ=128, dbc=16`.
    pub fn bfv_default() -> Self {
        Self {
            scheme: Scheme::Bfv,
            poly_modulus_degree: 4096,
            security_level: 128,
            plain_modulus: Some(1 << 10),
            coeff_modulus: Vec::new(),
            evaluation_decomposition_bit_count: 16,
            scale: 1.0,
        }
    }

    /// The hard-coded CKKS default: `N=1024, λ=128, dbc=60, coeff_modulus=[30;4]`.
    pub fn ckks_default() -> Self {
        Self {
            scheme: Scheme::Ckks,
            poly_modulus_degree: 1024,
            security_level: 128,
            plain_modulus: None,
            coeff_modulus: vec![30, 30, 30, 30],
            evaluation_decomposition_bit_count: 60,
            scale: (1u64 << 40) as f64,
        }
    }

    /// The hard-coded default for the given scheme.
    pub fn default_for(scheme: Scheme) -> Self {
        match scheme {
            Scheme::Bfv => Self::bfv_default(),
            Scheme::Ckks => Self::ckks_default(),
        }
    }

    /// Validates the fields against §3/§6's constraints.
    ///
    /// Equivalent to `original_source`'s `assert_valid_seal_parameter`, widened
    /// to the three security levels this spec recognizes.
    pub fn validate(&self) -> Result<()> {
        if !VALID_POLY_MODULUS_DEGREES.contains(&self.poly_modulus_degree) {
            return Err(Error::SchemeParamError(format!(
                "poly_modulus_degree must be one of {VALID_POLY_MODULUS_DEGREES:?}, got {}",
                self.poly_modulus_degree
            )));
        }
        if !VALID_SECURITY_LEVELS.contains(&self.security_level) {
            return Err(Error::SchemeParamError(format!(
                "security_level must be one of {VALID_SECURITY_LEVELS:?}, got {}",
                self.security_level
            )));
        }
        if !(1..=60).contains(&self.evaluation_decomposition_bit_count) {
            return Err(Error::SchemeParamError(format!(
                "evaluation_decomposition_bit_count must be in 1..=60, got {}",
                self.evaluation_decomposition_bit_count
            )));
        }
        match self.scheme {
            Scheme::Bfv => {
                if self.plain_modulus.map(|t| t == 0).unwrap_or(true) {
                    return Err(Error::SchemeParamError(
                        "BFV requires a positive plain_modulus".into(),
                    ));
                }
            }
            Scheme::Ckks => {
                if self.coeff_modulus.is_empty() {
                    return Err(Error::SchemeParamError(
                        "CKKS requires a non-empty coeff_modulus chain".into(),
                    ));
                }
                for bits in &self.coeff_modulus {
                    if !VALID_SMALL_MOD_BITS.contains(bits) {
                        return Err(Error::SchemeParamError(format!(
                            "coeff_modulus entries must be one of {VALID_SMALL_MOD_BITS:?}, got {bits}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Number of links in the CKKS modulus-switching chain; the highest chain
    /// index a freshly-encrypted ciphertext can occupy.
    pub fn top_chain_index(&self) -> u32 {
        match self.scheme {
            Scheme::Bfv => 0,
            Scheme::Ckks => self.coeff_modulus.len().saturating_sub(1) as u32,
        }
    }
}

/// The JSON shape read from the `HE_CONFIG` file, per §6.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSchemeConfig {
    scheme_name: String,
    poly_modulus_degree: u32,
    plain_modulus: Option<u64>,
    security_level: u32,
    evaluation_decomposition_bit_count: u32,
    #[serde(default)]
    coeff_modulus: Option<HashMap<String, u32>>,
    #[serde(default)]
    scale: Option<f64>,
}

fn parse_coeff_modulus(map: &HashMap<String, u32>) -> Result<Vec<u32>> {
    let mut chain = Vec::new();
    for bits in VALID_SMALL_MOD_BITS {
        let key = format!("small_mods_{bits}bit");
        if let Some(&count) = map.get(&key) {
            chain.extend(std::iter::repeat(bits).take(count as usize));
        }
    }
    let known_keys: Vec<String> = VALID_SMALL_MOD_BITS
        .iter()
        .map(|b| format!("small_mods_{b}bit"))
        .collect();
    for key in map.keys() {
        if !known_keys.contains(key) {
            return Err(Error::SchemeParamError(format!(
                "unknown coeff_modulus key {key}"
            )));
        }
    }
    Ok(chain)
}

fn config_to_params(raw: RawSchemeConfig) -> Result<SchemeParameters> {
    let scheme = match raw.scheme_name.as_str() {
        "BFV" => Scheme::Bfv,
        "CKKS" => Scheme::Ckks,
        other => {
            return Err(Error::SchemeParamError(format!(
                "unknown scheme_name {other:?}, expected \"BFV\" or \"CKKS\""
            )))
        }
    };

    let params = match scheme {
        Scheme::Bfv => {
            let plain_modulus = raw.plain_modulus.ok_or_else(|| {
                Error::SchemeParamError("BFV config missing plain_modulus".into())
            })?;
            SchemeParameters {
                scheme,
                poly_modulus_degree: raw.poly_modulus_degree,
                security_level: raw.security_level,
                plain_modulus: Some(plain_modulus),
                coeff_modulus: Vec::new(),
                evaluation_decomposition_bit_count: raw.evaluation_decomposition_bit_count,
                scale: 1.0,
            }
        }
        Scheme::Ckks => {
            let map = raw.coeff_modulus.ok_or_else(|| {
                Error::SchemeParamError("CKKS config missing coeff_modulus".into())
            })?;
            let chain = parse_coeff_modulus(&map)?;
            SchemeParameters {
                scheme,
                poly_modulus_degree: raw.poly_modulus_degree,
                security_level: raw.security_level,
                plain_modulus: None,
                coeff_modulus: chain,
                evaluation_decomposition_bit_count: raw.evaluation_decomposition_bit_count,
                scale: raw.scale.unwrap_or((1u64 << 40) as f64),
            }
        }
    };

    params.validate()?;
    Ok(params)
}

/// Reads `HE_CONFIG` (a path to a JSON file); if the env var is unset, returns
/// the hard-coded default for `scheme`. If the file exists but names a
/// different scheme than `scheme`, that's an error: callers ask for the
/// scheme they need, and a config naming another one can't satisfy that.
pub fn load_scheme_parameters(scheme: Scheme) -> Result<SchemeParameters> {
    let path = match std::env::var_os("HE_CONFIG") {
        Some(p) => p,
        None => return Ok(SchemeParameters::default_for(scheme)),
    };

    let text = std::fs::read_to_string(&path)?;
    let raw: RawSchemeConfig = serde_json::from_str(&text)
        .map_err(|e| Error::SchemeParamError(format!("HE_CONFIG parse error: {e}")))?;
    let params = config_to_params(raw)?;

    if params.scheme != scheme {
        return Err(Error::SchemeParamError(format!(
            "HE_CONFIG names {:?} but {:?} was requested",
            params.scheme, scheme
        )));
    }
    Ok(params)
}
