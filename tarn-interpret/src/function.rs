//! PDF functions, as used by shadings and soft masks.
//!
//! Types 0 (sampled), 2 (exponential) and 3 (stitching) are evaluated.
//! Type 4 (the PostScript calculator) is not carried; it evaluates to the
//! midpoint of its range with a warning.

use smallvec::{smallvec, SmallVec};
use tarn_syntax::bit::BitReader;
use tarn_syntax::object::name::keys;
use tarn_syntax::object::Value;
use tarn_syntax::Document;

/// Up to this many outputs are supported (CMYK plus headroom).
pub type Outputs = SmallVec<[f32; 8]>;

#[inline]
pub fn interpolate(x: f32, x_min: f32, x_max: f32, y_min: f32, y_max: f32) -> f32 {
    if x_max == x_min {
        y_min
    } else {
        y_min + (x - x_min) * (y_max - y_min) / (x_max - x_min)
    }
}

enum Kind {
    Sampled {
        inputs: usize,
        outputs: usize,
        size: Vec<u32>,
        encode: Vec<f32>,
        decode: Vec<f32>,
        samples: Vec<f32>,
    },
    Exponential {
        c0: Vec<f32>,
        c1: Vec<f32>,
        exponent: f32,
    },
    Stitching {
        functions: Vec<Function>,
        bounds: Vec<f32>,
        encode: Vec<f32>,
    },
    Unsupported {
        outputs: usize,
    },
}

/// An evaluatable PDF function.
pub struct Function {
    domain: Vec<f32>,
    range: Option<Vec<f32>>,
    kind: Kind,
}

impl Function {
    /// Build a function from its object (a dictionary or stream).
    pub fn load(doc: &Document, value: &Value) -> Option<Function> {
        let resolved = value.resolve();
        let dict = resolved.as_dict()?;

        let domain = dict.get(keys::DOMAIN).as_array()?.to_floats();
        let range = dict.get(keys::RANGE).as_array().map(|a| a.to_floats());

        let kind = match dict.get(keys::FUNCTION_TYPE).as_int() {
            0 => {
                let stream_num = value.as_ref_value()?.num;
                let data = doc.load_stream(stream_num).ok()?;

                let size = dict
                    .get(keys::SIZE)
                    .as_array()?
                    .to_ints()
                    .iter()
                    .map(|v| (*v).max(1) as u32)
                    .collect::<Vec<_>>();
                let bits = dict.get(keys::BITS_PER_SAMPLE).as_int() as u8;
                let range = range.clone()?;
                let outputs = range.len() / 2;
                let inputs = size.len();

                let encode = dict
                    .get(keys::ENCODE)
                    .as_array()
                    .map(|a| a.to_floats())
                    .unwrap_or_else(|| {
                        size.iter()
                            .flat_map(|s| [0.0, (*s - 1) as f32])
                            .collect()
                    });
                let decode = dict
                    .get(keys::DECODE)
                    .as_array()
                    .map(|a| a.to_floats())
                    .unwrap_or_else(|| range.clone());

                let samples = read_samples(&data, &size, outputs, bits)?;

                Kind::Sampled {
                    inputs,
                    outputs,
                    size,
                    encode,
                    decode,
                    samples,
                }
            }
            2 => Kind::Exponential {
                c0: dict
                    .get(keys::C0)
                    .as_array()
                    .map(|a| a.to_floats())
                    .unwrap_or_else(|| vec![0.0]),
                c1: dict
                    .get(keys::C1)
                    .as_array()
                    .map(|a| a.to_floats())
                    .unwrap_or_else(|| vec![1.0]),
                exponent: dict.get(keys::N).as_real(),
            },
            3 => {
                let list = dict.get(keys::FUNCTIONS).as_array()?;
                let mut functions = Vec::with_capacity(list.len());

                for i in 0..list.len() {
                    functions.push(Function::load(doc, &list.get_raw(i))?);
                }

                Kind::Stitching {
                    functions,
                    bounds: dict
                        .get(keys::BOUNDS)
                        .as_array()
                        .map(|a| a.to_floats())
                        .unwrap_or_default(),
                    encode: dict
                        .get(keys::ENCODE)
                        .as_array()
                        .map(|a| a.to_floats())
                        .unwrap_or_default(),
                }
            }
            4 => {
                log::warn!("PostScript calculator functions are not supported");
                Kind::Unsupported {
                    outputs: range.as_ref().map(|r| r.len() / 2).unwrap_or(1),
                }
            }
            other => {
                log::warn!("unknown function type {other}");
                Kind::Unsupported {
                    outputs: range.as_ref().map(|r| r.len() / 2).unwrap_or(1),
                }
            }
        };

        Some(Function {
            domain,
            range,
            kind,
        })
    }

    /// Evaluate at `inputs`, clamping into the domain and range.
    pub fn eval(&self, inputs: &[f32]) -> Outputs {
        let mut clamped: SmallVec<[f32; 2]> = SmallVec::new();

        for (i, v) in inputs.iter().enumerate() {
            let lo = self.domain.get(i * 2).copied().unwrap_or(0.0);
            let hi = self.domain.get(i * 2 + 1).copied().unwrap_or(1.0);
            clamped.push(v.clamp(lo.min(hi), hi.max(lo)));
        }

        let mut out = match &self.kind {
            Kind::Exponential { c0, c1, exponent } => {
                let t = clamped.first().copied().unwrap_or(0.0);
                let factor = t.powf(*exponent);

                let n = c0.len().max(c1.len());
                (0..n)
                    .map(|i| {
                        let a = c0.get(i).copied().unwrap_or(0.0);
                        let b = c1.get(i).copied().unwrap_or(1.0);
                        a + factor * (b - a)
                    })
                    .collect()
            }
            Kind::Stitching {
                functions,
                bounds,
                encode,
            } => {
                let t = clamped.first().copied().unwrap_or(0.0);
                let d0 = self.domain.first().copied().unwrap_or(0.0);
                let d1 = self.domain.get(1).copied().unwrap_or(1.0);

                let k = bounds.iter().take_while(|b| t >= **b).count();
                let k = k.min(functions.len().saturating_sub(1));

                let low = if k == 0 { d0 } else { bounds[k - 1] };
                let high = bounds.get(k).copied().unwrap_or(d1);

                let e0 = encode.get(k * 2).copied().unwrap_or(0.0);
                let e1 = encode.get(k * 2 + 1).copied().unwrap_or(1.0);

                let mapped = interpolate(t, low, high, e0, e1);

                match functions.get(k) {
                    Some(f) => f.eval(&[mapped]),
                    None => smallvec![],
                }
            }
            Kind::Sampled {
                inputs: m,
                outputs,
                size,
                encode,
                decode,
                samples,
            } => eval_sampled(&clamped, *m, *outputs, size, encode, decode, samples, &self.domain),
            Kind::Unsupported { outputs } => {
                let range = self.range.as_deref().unwrap_or(&[0.0, 1.0]);
                (0..*outputs)
                    .map(|i| {
                        let lo = range.get(i * 2).copied().unwrap_or(0.0);
                        let hi = range.get(i * 2 + 1).copied().unwrap_or(1.0);
                        (lo + hi) * 0.5
                    })
                    .collect()
            }
        };

        if let Some(range) = &self.range {
            for (i, v) in out.iter_mut().enumerate() {
                let lo = range.get(i * 2).copied().unwrap_or(f32::MIN);
                let hi = range.get(i * 2 + 1).copied().unwrap_or(f32::MAX);
                *v = v.clamp(lo.min(hi), hi.max(lo));
            }
        }

        out
    }
}

fn read_samples(data: &[u8], size: &[u32], outputs: usize, bits: u8) -> Option<Vec<f32>> {
    if !matches!(bits, 1 | 2 | 4 | 8 | 12 | 16 | 24 | 32) {
        return None;
    }

    let total: u64 = size.iter().map(|s| *s as u64).product::<u64>() * outputs as u64;
    if total > 1 << 24 {
        return None;
    }

    let max = ((1u64 << bits.min(63)) - 1) as f32;
    let mut reader = BitReader::new(data);
    let mut samples = Vec::with_capacity(total as usize);

    for _ in 0..total {
        samples.push(reader.read(bits)? as f32 / max);
    }

    Some(samples)
}

/// Multilinear interpolation over the sample grid, for one or two inputs.
#[allow(clippy::too_many_arguments)]
fn eval_sampled(
    inputs: &[f32],
    m: usize,
    outputs: usize,
    size: &[u32],
    encode: &[f32],
    decode: &[f32],
    samples: &[f32],
    domain: &[f32],
) -> Outputs {
    let coord = |i: usize| -> f32 {
        let x = inputs.get(i).copied().unwrap_or(0.0);
        let d0 = domain.get(i * 2).copied().unwrap_or(0.0);
        let d1 = domain.get(i * 2 + 1).copied().unwrap_or(1.0);
        let e0 = encode.get(i * 2).copied().unwrap_or(0.0);
        let e1 = encode
            .get(i * 2 + 1)
            .copied()
            .unwrap_or((size[i] - 1) as f32);

        interpolate(x, d0, d1, e0, e1).clamp(0.0, (size[i] - 1) as f32)
    };

    let sample_at = |indices: &[u32]| -> SmallVec<[f32; 8]> {
        let mut flat: u64 = 0;
        for i in (0..m).rev() {
            flat = flat * size[i] as u64 + indices[i] as u64;
        }
        let base = flat as usize * outputs;

        (0..outputs)
            .map(|j| samples.get(base + j).copied().unwrap_or(0.0))
            .collect()
    };

    let raw: SmallVec<[f32; 8]> = match m {
        1 => {
            let x = coord(0);
            let x0 = x.floor() as u32;
            let x1 = (x0 + 1).min(size[0] - 1);
            let fx = x - x0 as f32;

            let a = sample_at(&[x0]);
            let b = sample_at(&[x1]);

            (0..outputs).map(|j| a[j] + (b[j] - a[j]) * fx).collect()
        }
        2 => {
            let x = coord(0);
            let y = coord(1);
            let (x0, y0) = (x.floor() as u32, y.floor() as u32);
            let (x1, y1) = ((x0 + 1).min(size[0] - 1), (y0 + 1).min(size[1] - 1));
            let (fx, fy) = (x - x0 as f32, y - y0 as f32);

            let s00 = sample_at(&[x0, y0]);
            let s10 = sample_at(&[x1, y0]);
            let s01 = sample_at(&[x0, y1]);
            let s11 = sample_at(&[x1, y1]);

            (0..outputs)
                .map(|j| {
                    let a = s00[j] + (s10[j] - s00[j]) * fx;
                    let b = s01[j] + (s11[j] - s01[j]) * fx;
                    a + (b - a) * fy
                })
                .collect()
        }
        _ => {
            // Higher arities use nearest-neighbour sampling.
            let indices: Vec<u32> = (0..m).map(|i| coord(i).round() as u32).collect();
            sample_at(&indices)
        }
    };

    // Map sample values through Decode.
    (0..outputs)
        .map(|j| {
            let d0 = decode.get(j * 2).copied().unwrap_or(0.0);
            let d1 = decode.get(j * 2 + 1).copied().unwrap_or(1.0);
            interpolate(raw[j], 0.0, 1.0, d0, d1)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tarn_syntax::object::{Array, Dict};
    use std::sync::Arc;

    fn doc() -> Document {
        // Any valid document serves as a loading context here.
        let mut pdf = b"%PDF-1.4\n".to_vec();
        let o1 = pdf.len();
        pdf.extend_from_slice(b"1 0 obj << /Type /Catalog >> endobj\n");
        let xref = pdf.len();
        pdf.extend_from_slice(b"xref\n0 2\n0000000000 65535 f \n");
        pdf.extend_from_slice(format!("{o1:010} 00000 n \n").as_bytes());
        pdf.extend_from_slice(
            format!("trailer << /Size 2 /Root 1 0 R >>\nstartxref\n{xref}\n%%EOF").as_bytes(),
        );

        Document::open(Arc::new(pdf)).unwrap()
    }

    fn floats(v: &[f32]) -> Value {
        Value::Array(Array::from_vec(
            v.iter().map(|f| Value::Real(*f)).collect(),
        ))
    }

    #[test]
    fn exponential_interpolates() {
        let dict = Dict::new(4);
        dict.put_key(b"FunctionType", Value::Int(2));
        dict.put_key(b"Domain", floats(&[0.0, 1.0]));
        dict.put_key(b"C0", floats(&[0.0, 0.0, 1.0]));
        dict.put_key(b"C1", floats(&[1.0, 1.0, 0.0]));
        dict.put_key(b"N", Value::Real(1.0));

        let f = Function::load(&doc(), &Value::Dict(dict)).unwrap();

        assert_eq!(f.eval(&[0.0]).as_slice(), &[0.0, 0.0, 1.0]);
        assert_eq!(f.eval(&[1.0]).as_slice(), &[1.0, 1.0, 0.0]);
        assert_eq!(f.eval(&[0.5]).as_slice(), &[0.5, 0.5, 0.5]);

        // Inputs clamp into the domain.
        assert_eq!(f.eval(&[7.0]).as_slice(), &[1.0, 1.0, 0.0]);
    }

    #[test]
    fn stitching_selects_subfunction() {
        let half = |c0: f32, c1: f32| {
            let d = Dict::new(4);
            d.put_key(b"FunctionType", Value::Int(2));
            d.put_key(b"Domain", floats(&[0.0, 1.0]));
            d.put_key(b"C0", floats(&[c0]));
            d.put_key(b"C1", floats(&[c1]));
            d.put_key(b"N", Value::Real(1.0));
            Value::Dict(d)
        };

        let dict = Dict::new(5);
        dict.put_key(b"FunctionType", Value::Int(3));
        dict.put_key(b"Domain", floats(&[0.0, 1.0]));
        dict.put_key(
            b"Functions",
            Value::Array(Array::from_vec(vec![half(0.0, 0.5), half(0.5, 1.0)])),
        );
        dict.put_key(b"Bounds", floats(&[0.5]));
        dict.put_key(b"Encode", floats(&[0.0, 1.0, 0.0, 1.0]));

        let f = Function::load(&doc(), &Value::Dict(dict)).unwrap();

        assert!((f.eval(&[0.25])[0] - 0.25).abs() < 1e-6);
        assert!((f.eval(&[0.75])[0] - 0.75).abs() < 1e-6);
    }
}
