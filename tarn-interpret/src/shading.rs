//! Decoding the seven shading types.
//!
//! Axial and radial shadings bake their colour function into a 256-entry
//! lookup table; the function-based type samples a 32×32 grid; the mesh
//! types decode their bitstreams into triangles with colours already
//! converted to RGB. What leaves this module is exactly what the draw
//! device's shade painter consumes.

use crate::color::ColorSpace;
use crate::function::Function;
use kurbo::{Affine, Point, Rect};
use tarn_syntax::bit::BitReader;
use tarn_syntax::error::{Error, Result};
use tarn_syntax::geom::normalize_rect;
use tarn_syntax::object::name::keys;
use tarn_syntax::object::{Dict, Value};
use tarn_syntax::Document;

/// Entries in the colour table of axial and radial shadings.
pub const LUT_SIZE: usize = 256;

/// Grid resolution for sampling function-based shadings.
const FUNCTION_SEGMENTS: usize = 32;

/// Subdivision depth for Coons and tensor patches, per direction.
const PATCH_SUBDIVISIONS: usize = 3;

/// A mesh vertex in shading target space, colour already RGB.
#[derive(Debug, Copy, Clone)]
pub struct MeshVertex {
    pub x: f32,
    pub y: f32,
    pub rgb: [f32; 3],
}

#[derive(Debug, Copy, Clone)]
pub struct MeshTriangle {
    pub v: [MeshVertex; 3],
}

/// A decoded shading.
#[derive(Clone)]
pub enum ShadingKind {
    /// Linear interpolation along an axis, with optional extension.
    Axial {
        coords: [f32; 4],
        extend: [bool; 2],
        lut: Box<[[f32; 3]; LUT_SIZE]>,
    },
    /// Interpolation between two circles.
    Radial {
        coords: [f32; 6],
        extend: [bool; 2],
        lut: Box<[[f32; 3]; LUT_SIZE]>,
    },
    /// Any of the mesh forms, reduced to a triangle stream.
    Mesh { triangles: Vec<MeshTriangle> },
}

#[derive(Clone)]
pub struct Shading {
    pub kind: ShadingKind,
    /// Clip region in shading space, when present.
    pub bbox: Option<Rect>,
    /// Colour painted outside the shading's reach, when present.
    pub background: Option<[f32; 3]>,
}

/// Colour functions may be a single function or one per component.
struct FunctionSet {
    functions: Vec<Function>,
}

impl FunctionSet {
    fn load(doc: &Document, value: &Value) -> Option<FunctionSet> {
        let resolved = value.resolve();

        let functions = match &resolved {
            Value::Array(a) => {
                let mut out = Vec::with_capacity(a.len());
                for i in 0..a.len() {
                    out.push(Function::load(doc, &a.get_raw(i))?);
                }
                out
            }
            Value::Null => return None,
            _ => vec![Function::load(doc, value)?],
        };

        if functions.is_empty() {
            return None;
        }

        Some(FunctionSet { functions })
    }

    fn eval(&self, inputs: &[f32]) -> smallvec::SmallVec<[f32; 8]> {
        if self.functions.len() == 1 {
            self.functions[0].eval(inputs)
        } else {
            self.functions
                .iter()
                .map(|f| f.eval(inputs).first().copied().unwrap_or(0.0))
                .collect()
        }
    }
}

impl Shading {
    /// Decode a shading dictionary (or stream, for the mesh types).
    pub fn load(doc: &Document, value: &Value) -> Result<Shading> {
        let resolved = value.resolve();
        let Some(dict) = resolved.as_dict() else {
            return Err(Error::parse("shading is not a dictionary".into()));
        };

        let shading_type = dict.get(keys::SHADING_TYPE).as_int();
        let color_space = ColorSpace::from_value(&dict.get(keys::COLORSPACE));
        let function = FunctionSet::load(doc, &dict.get_raw(keys::FUNCTION).unwrap_or(Value::Null));

        let to_rgb = |comps: &[f32], function: &Option<FunctionSet>| -> [f32; 3] {
            match function {
                Some(f) => {
                    let out = f.eval(&comps[..1.min(comps.len())]);
                    color_space.to_rgb(&out)
                }
                None => color_space.to_rgb(comps),
            }
        };

        let kind = match shading_type {
            1 => decode_function_based(doc, &dict, &function, color_space)?,
            2 | 3 => {
                let Some(function) = function else {
                    return Err(Error::parse("axial/radial shading lacks a function".into()));
                };

                let domain = dict
                    .get(keys::DOMAIN)
                    .as_array()
                    .map(|a| a.to_floats())
                    .unwrap_or_else(|| vec![0.0, 1.0]);
                let (t0, t1) = (
                    domain.first().copied().unwrap_or(0.0),
                    domain.get(1).copied().unwrap_or(1.0),
                );

                // Bake the colour axis into a table sampled at
                // t0 + i/255·(t1−t0).
                let mut lut = Box::new([[0.0f32; 3]; LUT_SIZE]);
                for (i, slot) in lut.iter_mut().enumerate() {
                    let t = t0 + (i as f32 / (LUT_SIZE - 1) as f32) * (t1 - t0);
                    *slot = color_space.to_rgb(&function.eval(&[t]));
                }

                let extend = {
                    let v = dict.get(keys::EXTEND);
                    match v.as_array() {
                        Some(a) => [a.get(0).as_bool(), a.get(1).as_bool()],
                        None => [false, false],
                    }
                };

                let coords = dict
                    .get(keys::COORDS)
                    .as_array()
                    .map(|a| a.to_floats())
                    .unwrap_or_default();

                if shading_type == 2 {
                    if coords.len() < 4 {
                        return Err(Error::parse("axial shading needs four coordinates".into()));
                    }
                    ShadingKind::Axial {
                        coords: [coords[0], coords[1], coords[2], coords[3]],
                        extend,
                        lut,
                    }
                } else {
                    if coords.len() < 6 {
                        return Err(Error::parse("radial shading needs six coordinates".into()));
                    }
                    ShadingKind::Radial {
                        coords: [
                            coords[0], coords[1], coords[2], coords[3], coords[4], coords[5],
                        ],
                        extend,
                        lut,
                    }
                }
            }
            4 | 5 | 6 | 7 => {
                let Some(r) = value.as_ref_value() else {
                    return Err(Error::parse("mesh shading must be a stream object".into()));
                };
                let data = doc.load_stream(r.num)?;

                let triangles = match shading_type {
                    4 => decode_free_form(&dict, &data, &function, &to_rgb)?,
                    5 => decode_lattice(&dict, &data, &function, &to_rgb)?,
                    _ => decode_patches(&dict, &data, &function, &to_rgb, shading_type == 7)?,
                };

                ShadingKind::Mesh { triangles }
            }
            other => {
                return Err(Error::parse(format!("unknown shading type {other}")));
            }
        };

        let bbox = dict
            .get(keys::BBOX)
            .as_array()
            .map(|a| a.to_floats())
            .filter(|v| v.len() >= 4)
            .map(|v| {
                normalize_rect(&Rect::new(
                    v[0] as f64,
                    v[1] as f64,
                    v[2] as f64,
                    v[3] as f64,
                ))
            });

        let background = dict
            .get(keys::BACKGROUND)
            .as_array()
            .map(|a| a.to_floats())
            .map(|comps| to_rgb(&comps, &None));

        Ok(Shading {
            kind,
            bbox,
            background,
        })
    }
}

/// Type 1: sample the function over its domain on a fixed grid and emit a
/// quad per cell, transformed by the shading matrix.
fn decode_function_based(
    _doc: &Document,
    dict: &Dict,
    function: &Option<FunctionSet>,
    color_space: ColorSpace,
) -> Result<ShadingKind> {
    let Some(function) = function else {
        return Err(Error::parse("function-based shading lacks a function".into()));
    };

    let domain = dict
        .get(keys::DOMAIN)
        .as_array()
        .map(|a| a.to_floats())
        .unwrap_or_else(|| vec![0.0, 1.0, 0.0, 1.0]);
    let (x0, x1) = (
        domain.first().copied().unwrap_or(0.0),
        domain.get(1).copied().unwrap_or(1.0),
    );
    let (y0, y1) = (
        domain.get(2).copied().unwrap_or(0.0),
        domain.get(3).copied().unwrap_or(1.0),
    );

    let matrix = dict
        .get(keys::MATRIX)
        .as_array()
        .map(|a| a.to_floats())
        .filter(|v| v.len() >= 6)
        .map(|v| {
            Affine::new([
                v[0] as f64,
                v[1] as f64,
                v[2] as f64,
                v[3] as f64,
                v[4] as f64,
                v[5] as f64,
            ])
        })
        .unwrap_or(Affine::IDENTITY);

    let n = FUNCTION_SEGMENTS;
    let vertex = |i: usize, j: usize| -> MeshVertex {
        let x = x0 + (x1 - x0) * i as f32 / n as f32;
        let y = y0 + (y1 - y0) * j as f32 / n as f32;
        let p = matrix * Point::new(x as f64, y as f64);
        let rgb = color_space.to_rgb(&function.eval(&[x, y]));

        MeshVertex {
            x: p.x as f32,
            y: p.y as f32,
            rgb,
        }
    };

    let mut triangles = Vec::with_capacity(n * n * 2);

    for i in 0..n {
        for j in 0..n {
            let v00 = vertex(i, j);
            let v10 = vertex(i + 1, j);
            let v11 = vertex(i + 1, j + 1);
            let v01 = vertex(i, j + 1);

            triangles.push(MeshTriangle { v: [v00, v10, v11] });
            triangles.push(MeshTriangle { v: [v00, v11, v01] });
        }
    }

    Ok(ShadingKind::Mesh { triangles })
}

/// Clamp a declared bit width to the nearest legal value.
fn sanitize_bits(requested: i32, legal: &[u8]) -> u8 {
    legal
        .iter()
        .copied()
        .min_by_key(|l| (requested - *l as i32).abs())
        .unwrap_or(8)
}

struct MeshParams {
    bpf: u8,
    bp_coord: u8,
    bp_comp: u8,
    decode: Vec<f32>,
    components: usize,
}

impl MeshParams {
    fn load(dict: &Dict, function: &Option<FunctionSet>, with_flags: bool) -> Result<MeshParams> {
        let bpf = if with_flags {
            sanitize_bits(dict.get(keys::BITS_PER_FLAG).as_int(), &[2, 4, 8])
        } else {
            0
        };
        let bp_coord = sanitize_bits(
            dict.get(keys::BITS_PER_COORDINATE).as_int(),
            &[1, 2, 4, 8, 12, 16, 24, 32],
        );
        let bp_comp = sanitize_bits(
            dict.get(keys::BITS_PER_COMPONENT).as_int(),
            &[1, 2, 4, 8, 12, 16],
        );

        let decode = dict
            .get(keys::DECODE)
            .as_array()
            .map(|a| a.to_floats())
            .unwrap_or_default();

        if decode.len() < 6 {
            return Err(Error::parse("mesh shading Decode array is too short".into()));
        }

        let components = if function.is_some() {
            1
        } else {
            (decode.len() - 4) / 2
        };

        Ok(MeshParams {
            bpf,
            bp_coord,
            bp_comp,
            decode,
            components,
        })
    }

    fn read_coord(&self, r: &mut BitReader<'_>, axis: usize) -> Option<f32> {
        let raw = r.read(self.bp_coord)? as f32;
        let max = (2.0f32).powi(self.bp_coord as i32) - 1.0;
        let lo = self.decode[axis * 2];
        let hi = self.decode[axis * 2 + 1];

        Some(lo + raw / max * (hi - lo))
    }

    fn read_components(&self, r: &mut BitReader<'_>) -> Option<Vec<f32>> {
        let max = (2.0f32).powi(self.bp_comp as i32) - 1.0;
        let mut out = Vec::with_capacity(self.components);

        for c in 0..self.components {
            let raw = r.read(self.bp_comp)? as f32;
            let lo = self.decode[4 + c * 2];
            let hi = self.decode[4 + c * 2 + 1];
            out.push(lo + raw / max * (hi - lo));
        }

        Some(out)
    }
}

/// Type 4: free-form Gouraud triangles with per-vertex reuse flags.
fn decode_free_form(
    dict: &Dict,
    data: &[u8],
    function: &Option<FunctionSet>,
    to_rgb: &dyn Fn(&[f32], &Option<FunctionSet>) -> [f32; 3],
) -> Result<Vec<MeshTriangle>> {
    let params = MeshParams::load(dict, function, true)?;
    let mut r = BitReader::new(data);
    let mut triangles = Vec::new();

    let read_vertex = |r: &mut BitReader<'_>| -> Option<(u32, MeshVertex)> {
        let flag = r.read(params.bpf)?;
        let x = params.read_coord(r, 0)?;
        let y = params.read_coord(r, 1)?;
        let comps = params.read_components(r)?;
        r.align();

        Some((
            flag,
            MeshVertex {
                x,
                y,
                rgb: to_rgb(&comps, function),
            },
        ))
    };

    let mut a: Option<MeshVertex> = None;
    let mut b: Option<MeshVertex> = None;
    let mut c: Option<MeshVertex> = None;

    while let Some((flag, vertex)) = read_vertex(&mut r) {
        match flag {
            0 => {
                let Some((_, second)) = read_vertex(&mut r) else {
                    break;
                };
                let Some((_, third)) = read_vertex(&mut r) else {
                    break;
                };

                a = Some(vertex);
                b = Some(second);
                c = Some(third);
            }
            1 => {
                // Reuse Vb and Vc of the previous triangle.
                a = b;
                b = c;
                c = Some(vertex);
            }
            2 => {
                // Reuse Va and Vc of the previous triangle.
                b = c;
                c = Some(vertex);
            }
            other => {
                log::warn!("free-form mesh has invalid edge flag {other}");
                break;
            }
        }

        if let (Some(a), Some(b), Some(c)) = (a, b, c) {
            triangles.push(MeshTriangle { v: [a, b, c] });
        }
    }

    Ok(triangles)
}

/// Type 5: a lattice of vertices, triangulated between successive rows.
fn decode_lattice(
    dict: &Dict,
    data: &[u8],
    function: &Option<FunctionSet>,
    to_rgb: &dyn Fn(&[f32], &Option<FunctionSet>) -> [f32; 3],
) -> Result<Vec<MeshTriangle>> {
    let params = MeshParams::load(dict, function, false)?;

    let per_row = dict.get(keys::VERTICES_PER_ROW).as_int();
    if per_row < 2 {
        return Err(Error::parse("lattice mesh needs at least two vertices per row".into()));
    }
    let per_row = per_row as usize;

    let mut r = BitReader::new(data);
    let mut rows: Vec<Vec<MeshVertex>> = Vec::new();

    'rows: loop {
        let mut row = Vec::with_capacity(per_row);

        for _ in 0..per_row {
            let Some(x) = params.read_coord(&mut r, 0) else {
                break 'rows;
            };
            let Some(y) = params.read_coord(&mut r, 1) else {
                break 'rows;
            };
            let Some(comps) = params.read_components(&mut r) else {
                break 'rows;
            };
            r.align();

            row.push(MeshVertex {
                x,
                y,
                rgb: to_rgb(&comps, function),
            });
        }

        rows.push(row);
    }

    let mut triangles = Vec::new();

    for i in 1..rows.len() {
        for j in 1..per_row {
            let (v00, v01) = (rows[i - 1][j - 1], rows[i - 1][j]);
            let (v10, v11) = (rows[i][j - 1], rows[i][j]);

            triangles.push(MeshTriangle { v: [v00, v10, v01] });
            triangles.push(MeshTriangle { v: [v11, v10, v01] });
        }
    }

    Ok(triangles)
}

/// A tensor patch: 4×4 control poles and four corner colours.
#[derive(Clone)]
struct TensorPatch {
    pole: [[Point; 4]; 4],
    color: [[f32; 3]; 4],
}

fn mid_color(a: &[f32; 3], b: &[f32; 3]) -> [f32; 3] {
    [
        (a[0] + b[0]) * 0.5,
        (a[1] + b[1]) * 0.5,
        (a[2] + b[2]) * 0.5,
    ]
}

fn mid_point(a: Point, b: Point) -> Point {
    Point::new((a.x + b.x) * 0.5, (a.y + b.y) * 0.5)
}

/// De Casteljau midpoint split of one cubic.
fn split_curve(p: [Point; 4]) -> ([Point; 4], [Point; 4]) {
    let p01 = mid_point(p[0], p[1]);
    let p12 = mid_point(p[1], p[2]);
    let p23 = mid_point(p[2], p[3]);
    let p012 = mid_point(p01, p12);
    let p123 = mid_point(p12, p23);
    let mid = mid_point(p012, p123);

    ([p[0], p01, p012, mid], [mid, p123, p23, p[3]])
}

/// Split along the column (u) direction.
fn split_u(patch: &TensorPatch) -> (TensorPatch, TensorPatch) {
    let mut left = patch.clone();
    let mut right = patch.clone();

    for i in 0..4 {
        let (a, b) = split_curve(patch.pole[i]);
        left.pole[i] = a;
        right.pole[i] = b;
    }

    let top_mid = mid_color(&patch.color[0], &patch.color[1]);
    let bottom_mid = mid_color(&patch.color[3], &patch.color[2]);

    left.color = [patch.color[0], top_mid, bottom_mid, patch.color[3]];
    right.color = [top_mid, patch.color[1], patch.color[2], bottom_mid];

    (left, right)
}

/// Split along the row (v) direction.
fn split_v(patch: &TensorPatch) -> (TensorPatch, TensorPatch) {
    let mut top = patch.clone();
    let mut bottom = patch.clone();

    for j in 0..4 {
        let column = [
            patch.pole[0][j],
            patch.pole[1][j],
            patch.pole[2][j],
            patch.pole[3][j],
        ];
        let (a, b) = split_curve(column);

        for i in 0..4 {
            top.pole[i][j] = a[i];
            bottom.pole[i][j] = b[i];
        }
    }

    let left_mid = mid_color(&patch.color[0], &patch.color[3]);
    let right_mid = mid_color(&patch.color[1], &patch.color[2]);

    top.color = [patch.color[0], patch.color[1], right_mid, left_mid];
    bottom.color = [left_mid, right_mid, patch.color[2], patch.color[3]];

    (top, bottom)
}

fn emit_patch(patch: &TensorPatch, depth: usize, out: &mut Vec<MeshTriangle>) {
    if depth == 0 {
        let corner = |i: usize, j: usize, c: usize| MeshVertex {
            x: patch.pole[i][j].x as f32,
            y: patch.pole[i][j].y as f32,
            rgb: patch.color[c],
        };

        let v0 = corner(0, 0, 0);
        let v1 = corner(0, 3, 1);
        let v2 = corner(3, 3, 2);
        let v3 = corner(3, 0, 3);

        out.push(MeshTriangle { v: [v0, v1, v3] });
        out.push(MeshTriangle { v: [v1, v3, v2] });
        return;
    }

    let (left, right) = split_u(patch);

    for half in [left, right] {
        let (top, bottom) = split_v(&half);
        emit_patch(&top, depth - 1, out);
        emit_patch(&bottom, depth - 1, out);
    }
}

/// Fill the four interior poles of a Coons patch from its boundary.
fn coons_interior(pole: &mut [[Point; 4]; 4]) {
    let p = *pole;
    let combine = |corner: Point,
                   e1: Point,
                   e2: Point,
                   f1: Point,
                   f2: Point,
                   n1: Point,
                   n2: Point,
                   far: Point| {
        Point::new(
            (-4.0 * corner.x + 6.0 * (e1.x + e2.x) - 2.0 * (f1.x + f2.x)
                + 3.0 * (n1.x + n2.x)
                - far.x)
                / 9.0,
            (-4.0 * corner.y + 6.0 * (e1.y + e2.y) - 2.0 * (f1.y + f2.y)
                + 3.0 * (n1.y + n2.y)
                - far.y)
                / 9.0,
        )
    };

    pole[1][1] = combine(
        p[0][0], p[0][1], p[1][0], p[0][3], p[3][0], p[3][1], p[1][3], p[3][3],
    );
    pole[1][2] = combine(
        p[0][3], p[0][2], p[1][3], p[0][0], p[3][3], p[3][2], p[1][0], p[3][0],
    );
    pole[2][1] = combine(
        p[3][0], p[3][1], p[2][0], p[3][3], p[0][0], p[0][1], p[2][3], p[0][3],
    );
    pole[2][2] = combine(
        p[3][3], p[3][2], p[2][3], p[3][0], p[0][3], p[0][2], p[2][0], p[0][0],
    );
}

/// Place the twelve boundary points into the 4×4 pole grid.
fn place_boundary(points: &[Point; 12], pole: &mut [[Point; 4]; 4]) {
    pole[0][0] = points[0];
    pole[0][1] = points[1];
    pole[0][2] = points[2];
    pole[0][3] = points[3];
    pole[1][3] = points[4];
    pole[2][3] = points[5];
    pole[3][3] = points[6];
    pole[3][2] = points[7];
    pole[3][1] = points[8];
    pole[3][0] = points[9];
    pole[2][0] = points[10];
    pole[1][0] = points[11];
}

/// Types 6 and 7: Coons and tensor-product patch meshes.
fn decode_patches(
    dict: &Dict,
    data: &[u8],
    function: &Option<FunctionSet>,
    to_rgb: &dyn Fn(&[f32], &Option<FunctionSet>) -> [f32; 3],
    tensor: bool,
) -> Result<Vec<MeshTriangle>> {
    let params = MeshParams::load(dict, function, true)?;
    let mut r = BitReader::new(data);

    let mut triangles = Vec::new();
    let mut prev: Option<([Point; 12], [[f32; 3]; 4])> = None;

    loop {
        let Some(flag) = r.read(params.bpf) else {
            break;
        };

        let mut boundary = [Point::ZERO; 12];
        let mut colors = [[0.0f32; 3]; 4];

        let reused = match (flag, &prev) {
            (0, _) => 0,
            (1, Some((p, c))) => {
                boundary[0] = p[3];
                boundary[1] = p[4];
                boundary[2] = p[5];
                boundary[3] = p[6];
                colors[0] = c[1];
                colors[1] = c[2];
                4
            }
            (2, Some((p, c))) => {
                boundary[0] = p[6];
                boundary[1] = p[7];
                boundary[2] = p[8];
                boundary[3] = p[9];
                colors[0] = c[2];
                colors[1] = c[3];
                4
            }
            (3, Some((p, c))) => {
                boundary[0] = p[9];
                boundary[1] = p[10];
                boundary[2] = p[11];
                boundary[3] = p[0];
                colors[0] = c[3];
                colors[1] = c[0];
                4
            }
            _ => {
                log::warn!("patch mesh reuses an edge without a previous patch");
                break;
            }
        };

        let mut read_point = |r: &mut BitReader<'_>| -> Option<Point> {
            let x = params.read_coord(r, 0)?;
            let y = params.read_coord(r, 1)?;
            Some(Point::new(x as f64, y as f64))
        };

        let mut complete = true;

        for slot in boundary.iter_mut().skip(reused) {
            match read_point(&mut r) {
                Some(p) => *slot = p,
                None => {
                    complete = false;
                    break;
                }
            }
        }

        if !complete {
            break;
        }

        let mut pole = [[Point::ZERO; 4]; 4];
        place_boundary(&boundary, &mut pole);

        if tensor {
            // Four explicit interior poles, row by row.
            let interior = [
                read_point(&mut r),
                read_point(&mut r),
                read_point(&mut r),
                read_point(&mut r),
            ];

            match interior {
                [Some(a), Some(b), Some(c), Some(d)] => {
                    pole[1][1] = a;
                    pole[1][2] = b;
                    pole[2][2] = c;
                    pole[2][1] = d;
                }
                _ => break,
            }
        } else {
            coons_interior(&mut pole);
        }

        let color_start = if reused == 0 { 0 } else { 2 };
        for slot in color_start..4 {
            let Some(comps) = params.read_components(&mut r) else {
                complete = false;
                break;
            };
            colors[slot] = to_rgb(&comps, function);
        }

        if !complete {
            break;
        }

        r.align();

        let patch = TensorPatch {
            pole,
            color: colors,
        };
        emit_patch(&patch, PATCH_SUBDIVISIONS, &mut triangles);

        prev = Some((boundary, colors));
    }

    Ok(triangles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_width_sanitizing_picks_nearest_legal() {
        assert_eq!(sanitize_bits(3, &[2, 4, 8]), 2);
        assert_eq!(sanitize_bits(7, &[2, 4, 8]), 8);
        assert_eq!(sanitize_bits(20, &[1, 2, 4, 8, 12, 16, 24, 32]), 24);
        assert_eq!(sanitize_bits(-5, &[1, 2, 4, 8, 12, 16]), 1);
    }

    #[test]
    fn patch_subdivision_emits_expected_triangle_count() {
        // A flat unit-square patch.
        let mut pole = [[Point::ZERO; 4]; 4];
        for (i, row) in pole.iter_mut().enumerate() {
            for (j, p) in row.iter_mut().enumerate() {
                *p = Point::new(j as f64 / 3.0, i as f64 / 3.0);
            }
        }

        let patch = TensorPatch {
            pole,
            color: [[0.0; 3], [1.0, 0.0, 0.0], [1.0; 3], [0.0, 1.0, 0.0]],
        };

        let mut out = Vec::new();
        emit_patch(&patch, PATCH_SUBDIVISIONS, &mut out);

        // Depth 3 in both directions: 8×8 sub-patches, two triangles each.
        assert_eq!(out.len(), 64 * 2);

        // All vertices stay inside the flat patch.
        for t in &out {
            for v in &t.v {
                assert!((-0.01..=1.01).contains(&v.x));
                assert!((-0.01..=1.01).contains(&v.y));
            }
        }
    }

    #[test]
    fn curve_split_preserves_endpoints() {
        let p = [
            Point::new(0.0, 0.0),
            Point::new(1.0, 2.0),
            Point::new(3.0, 2.0),
            Point::new(4.0, 0.0),
        ];

        let (a, b) = split_curve(p);
        assert_eq!(a[0], p[0]);
        assert_eq!(b[3], p[3]);
        assert_eq!(a[3], b[0]);
        // The midpoint of this symmetric curve sits at x=2.
        assert!((a[3].x - 2.0).abs() < 1e-9);
    }
}
