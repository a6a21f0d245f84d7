//! End-to-end rendering scenarios over synthesized documents.

use kurbo::Affine;
use std::sync::Arc;
use tarn::interpret::devices::BboxDevice;
use tarn::interpret::{run_page, Cookie};
use tarn::{Document, RenderOptions};

enum Obj {
    Plain(String),
    Stream(String, Vec<u8>),
}

/// Assemble a classic-xref document from numbered objects. Object 1 must
/// be the catalog.
fn build_pdf(objects: Vec<(i32, Obj)>) -> Vec<u8> {
    let mut pdf = b"%PDF-1.7\n".to_vec();
    let max = objects.iter().map(|(n, _)| *n).max().unwrap_or(0);
    let mut offsets = vec![0usize; max as usize + 1];

    for (num, obj) in &objects {
        offsets[*num as usize] = pdf.len();

        match obj {
            Obj::Plain(body) => {
                pdf.extend_from_slice(format!("{num} 0 obj {body} endobj\n").as_bytes());
            }
            Obj::Stream(dict, data) => {
                pdf.extend_from_slice(
                    format!("{num} 0 obj << {dict} /Length {} >> stream\n", data.len()).as_bytes(),
                );
                pdf.extend_from_slice(data);
                pdf.extend_from_slice(b"\nendstream endobj\n");
            }
        }
    }

    let xref_offset = pdf.len();
    pdf.extend_from_slice(format!("xref\n0 {}\n", max + 1).as_bytes());
    pdf.extend_from_slice(b"0000000000 65535 f \n");
    for num in 1..=max as usize {
        pdf.extend_from_slice(format!("{:010} 00000 n \n", offsets[num]).as_bytes());
    }
    pdf.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF",
            max + 1
        )
        .as_bytes(),
    );

    pdf
}

fn single_page_pdf(media: &str, resources: &str, content: &str, extra: Vec<(i32, Obj)>) -> Vec<u8> {
    let mut objects = vec![
        (1, Obj::Plain("<< /Type /Catalog /Pages 2 0 R >>".into())),
        (
            2,
            Obj::Plain(format!(
                "<< /Type /Pages /Kids [3 0 R] /Count 1 /MediaBox [{media}] >>"
            )),
        ),
        (
            3,
            Obj::Plain(format!(
                "<< /Type /Page /Parent 2 0 R /Resources {resources} /Contents 4 0 R >>"
            )),
        ),
        (4, Obj::Stream(String::new(), content.as_bytes().to_vec())),
    ];
    objects.extend(extra);

    build_pdf(objects)
}

fn pixel(pix: &tarn::render::Pixmap, x: i32, y: i32) -> [u8; 4] {
    let rgba = pix.to_rgba8();
    let index = (y as usize * pix.w as usize + x as usize) * 4;
    [rgba[index], rgba[index + 1], rgba[index + 2], rgba[index + 3]]
}

fn close(a: u8, b: u8, tolerance: u8) -> bool {
    (a as i32 - b as i32).unsigned_abs() <= tolerance as u32
}

/// Scenario 1: a two-page document whose xref subsection covers the
/// trailer's full Size; pages enumerate, bound and measure.
#[test]
fn two_pages_measure_marks() {
    let objects = vec![
        (1, Obj::Plain("<< /Type /Catalog /Pages 2 0 R >>".into())),
        (
            2,
            Obj::Plain(
                "<< /Type /Pages /Kids [3 0 R 5 0 R] /Count 2 /MediaBox [0 0 300 300] >>".into(),
            ),
        ),
        (
            3,
            Obj::Plain("<< /Type /Page /Parent 2 0 R /Contents 4 0 R >>".into()),
        ),
        (
            4,
            Obj::Stream(
                String::new(),
                b"0 0 1 rg 10 10 50 40 re f 1 0 0 RG 100 100 m 150 150 l S".to_vec(),
            ),
        ),
        (
            5,
            Obj::Plain("<< /Type /Page /Parent 2 0 R /Contents 6 0 R >>".into()),
        ),
        (6, Obj::Stream(String::new(), b"0 0 5 5 re f".to_vec())),
    ];

    let doc = Document::open(Arc::new(build_pdf(objects))).unwrap();

    assert_eq!(doc.count_pages(), 2);

    let bound = doc.bound_page(0).unwrap();
    assert_eq!((bound.x0, bound.y0, bound.x1, bound.y1), (0.0, 0.0, 300.0, 300.0));

    let page = doc.page(0).unwrap();
    let mut bbox = BboxDevice::new();
    run_page(&doc, &page, &mut bbox, Affine::IDENTITY, None).unwrap();

    let union = bbox.bbox().expect("page 0 has marks");

    // The union covers the filled rectangle and the stroked diagonal.
    assert!(union.x0 <= 10.0 && union.y0 <= 10.0);
    assert!(union.x1 >= 150.0 && union.y1 >= 150.0);
    assert!(union.x1 <= 152.0 && union.y1 <= 152.0);
}

/// Scenario 2: a startxref pointing past EOF opens via repair and the
/// outline survives.
#[test]
fn repair_preserves_outline() {
    let objects = vec![
        (
            1,
            Obj::Plain("<< /Type /Catalog /Pages 2 0 R /Outlines 5 0 R >>".into()),
        ),
        (
            2,
            Obj::Plain(
                "<< /Type /Pages /Kids [3 0 R] /Count 1 /MediaBox [0 0 100 100] >>".into(),
            ),
        ),
        (
            3,
            Obj::Plain("<< /Type /Page /Parent 2 0 R /Contents 4 0 R >>".into()),
        ),
        (4, Obj::Stream(String::new(), b"0 0 10 10 re f".to_vec())),
        (
            5,
            Obj::Plain("<< /Type /Outlines /First 6 0 R /Last 6 0 R >>".into()),
        ),
        (6, Obj::Plain("<< /Title (Only chapter) >>".into())),
    ];

    let mut pdf = build_pdf(objects);
    let pos = pdf.windows(9).rposition(|w| w == b"startxref").unwrap();
    pdf.truncate(pos);
    pdf.extend_from_slice(b"startxref\n123456789\n%%EOF");

    let doc = Document::open(Arc::new(pdf)).unwrap();
    assert!(doc.is_repaired());
    assert_eq!(doc.count_pages(), 1);

    let outline = doc.load_outline().unwrap();
    assert_eq!(outline.len(), 1);
    assert_eq!(outline[0].title, "Only chapter");

    // Without /Outlines the same document reports none.
    let objects = vec![
        (1, Obj::Plain("<< /Type /Catalog /Pages 2 0 R >>".into())),
        (
            2,
            Obj::Plain("<< /Type /Pages /Kids [] /Count 0 >>".into()),
        ),
    ];
    let doc = Document::open(Arc::new(build_pdf(objects))).unwrap();
    assert!(doc.load_outline().is_none());
}

/// Scenario 3: a mid-gray rectangle lands on exactly the expected pixels.
#[test]
fn gray_rectangle_renders_exact() {
    let pdf = single_page_pdf("0 0 300 300", "<< >>", "0.5 g 100 100 100 100 re f", vec![]);
    let doc = Document::open(Arc::new(pdf)).unwrap();

    let pix = tarn::render_page(&doc, 0, &RenderOptions::default()).unwrap();
    assert_eq!((pix.w, pix.h), (300, 300));

    for (x, y) in [(100, 100), (150, 150), (199, 199), (100, 199)] {
        let px = pixel(&pix, x, y);
        assert!(
            close(px[0], 128, 1) && close(px[1], 128, 1) && close(px[2], 128, 1),
            "inside pixel ({x},{y}) is {px:?}"
        );
        assert_eq!(px[3], 255);
    }

    for (x, y) in [(99, 100), (200, 150), (150, 99), (150, 200), (0, 0), (299, 299)] {
        assert_eq!(pixel(&pix, x, y), [255, 255, 255, 255], "outside pixel ({x},{y})");
    }
}

/// Scenario 4: a luminosity soft mask from a filled circle gates a red
/// fill, with an anti-aliased rim.
#[test]
fn soft_mask_circle() {
    let circle = "100 50 m \
                  100 77.61 77.61 100 50 100 c \
                  22.39 100 0 77.61 0 50 c \
                  0 22.39 22.39 0 50 0 c \
                  77.61 0 100 22.39 100 50 c f";

    let form_content = format!("1 g {circle}");

    let pdf = single_page_pdf(
        "0 0 100 100",
        "<< /ExtGState << /GS0 6 0 R >> >>",
        "/GS0 gs 1 0 0 rg 0 0 100 100 re f",
        vec![
            (
                5,
                Obj::Stream(
                    "/Type /XObject /Subtype /Form /BBox [0 0 100 100]".into(),
                    form_content.into_bytes(),
                ),
            ),
            (
                6,
                Obj::Plain("<< /SMask << /S /Luminosity /G 5 0 R >> >>".into()),
            ),
        ],
    );

    let doc = Document::open(Arc::new(pdf)).unwrap();
    let pix = tarn::render_page(&doc, 0, &RenderOptions::default()).unwrap();

    // Inside the circle: red.
    let centre = pixel(&pix, 50, 50);
    assert!(close(centre[0], 255, 2) && close(centre[1], 0, 2), "{centre:?}");

    // Outside: untouched white.
    assert_eq!(pixel(&pix, 3, 3), [255, 255, 255, 255]);
    assert_eq!(pixel(&pix, 96, 3), [255, 255, 255, 255]);

    // The rim blends softly: red-to-white intermediates exist.
    let mut intermediate = 0;
    for y in 0..100 {
        for x in 0..100 {
            let px = pixel(&pix, x, y);
            if px[0] == 255 && px[1] > 10 && px[1] < 245 {
                intermediate += 1;
            }
        }
    }
    assert!(intermediate >= 4, "only {intermediate} blended rim pixels");
}

/// Scenario 5: an axial blue-to-yellow shading across the diagonal.
#[test]
fn axial_shading_diagonal() {
    let pdf = single_page_pdf(
        "0 0 200 200",
        "<< /Shading << /Sh0 5 0 R >> >>",
        "/Sh0 sh",
        vec![(
            5,
            Obj::Plain(
                "<< /ShadingType 2 /ColorSpace /DeviceRGB \
                 /Coords [0 200 200 0] /Extend [true true] \
                 /Function << /FunctionType 2 /Domain [0 1] \
                 /C0 [0 0 1] /C1 [1 1 0] /N 1 >> >>"
                    .into(),
            ),
        )],
    );

    let doc = Document::open(Arc::new(pdf)).unwrap();
    let pix = tarn::render_page(&doc, 0, &RenderOptions::default()).unwrap();

    // Device (0,0) is user (0,200): the blue end.
    let blue = pixel(&pix, 0, 0);
    assert!(close(blue[0], 0, 5) && close(blue[1], 0, 5) && close(blue[2], 255, 5), "{blue:?}");

    let yellow = pixel(&pix, 199, 199);
    assert!(
        close(yellow[0], 255, 5) && close(yellow[1], 255, 5) && close(yellow[2], 0, 5),
        "{yellow:?}"
    );

    let mid = pixel(&pix, 100, 100);
    assert!(
        close(mid[0], 128, 5) && close(mid[1], 128, 5) && close(mid[2], 128, 5),
        "{mid:?}"
    );
}

/// Scenario 6: an off-grid pattern tile covers its fill region completely.
#[test]
fn tiling_pattern_covers() {
    // Each 20x20 cell paints its lower-left 10x10 square black; the
    // pattern grid is shifted by (5, 7) in user space.
    let pdf = single_page_pdf(
        "0 0 100 100",
        "<< /Pattern << /P0 5 0 R >> >>",
        "/Pattern cs /P0 scn 0 0 100 100 re f",
        vec![(
            5,
            Obj::Stream(
                "/Type /Pattern /PatternType 1 /PaintType 1 /TilingType 1 \
                 /BBox [0 0 20 20] /XStep 20 /YStep 20 \
                 /Matrix [1 0 0 1 5 7] /Resources << >>"
                    .into(),
                b"0 g 0 0 10 10 re f".to_vec(),
            ),
        )],
    );

    let doc = Document::open(Arc::new(pdf)).unwrap();
    let pix = tarn::render_page(&doc, 0, &RenderOptions::default()).unwrap();

    // User-space lattice: black squares at (5+20i, 7+20j) + [0,10)^2.
    // Sample well inside painted cells and gaps, converting y to device.
    let device_y = |user_y: i32| 100 - 1 - user_y;

    // Inside a black square.
    for (ux, uy) in [(8, 10), (28, 10), (8, 30), (48, 50), (88, 90)] {
        let px = pixel(&pix, ux, device_y(uy));
        assert!(px[0] < 60, "expected paint at user ({ux},{uy}), got {px:?}");
    }

    // In the unpainted part of a cell.
    for (ux, uy) in [(18, 10), (8, 20), (38, 30)] {
        let px = pixel(&pix, ux, device_y(uy));
        assert_eq!(px, [255, 255, 255, 255], "expected gap at user ({ux},{uy})");
    }
}

/// A tile with a negative step is refused before tiling begins.
#[test]
fn negative_tile_step_is_an_error() {
    let pdf = single_page_pdf(
        "0 0 100 100",
        "<< /Pattern << /P0 5 0 R >> >>",
        "/Pattern cs /P0 scn 0 0 100 100 re f",
        vec![(
            5,
            Obj::Stream(
                "/Type /Pattern /PatternType 1 /BBox [0 0 20 20] \
                 /XStep -20 /YStep 20 /Resources << >>"
                    .into(),
                b"0 g 0 0 10 10 re f".to_vec(),
            ),
        )],
    );

    let doc = Document::open(Arc::new(pdf)).unwrap();
    assert!(tarn::render_page(&doc, 0, &RenderOptions::default()).is_err());
}

/// Aborting through the cookie before the run leaves the page blank and
/// reports success.
#[test]
fn cookie_abort_is_clean() {
    let pdf = single_page_pdf("0 0 50 50", "<< >>", "0 g 0 0 50 50 re f", vec![]);
    let doc = Document::open(Arc::new(pdf)).unwrap();

    let cookie = Arc::new(Cookie::new());
    cookie.abort();

    let options = RenderOptions {
        cookie: Some(cookie),
        ..RenderOptions::default()
    };

    let pix = tarn::render_page(&doc, 0, &options).unwrap();
    assert_eq!(pixel(&pix, 25, 25), [255, 255, 255, 255]);
}

/// Flate-compressed content streams decode through the filter registry.
#[test]
fn compressed_content_stream() {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(b"0 g 10 10 30 30 re f").unwrap();
    let compressed = enc.finish().unwrap();

    let objects = vec![
        (1, Obj::Plain("<< /Type /Catalog /Pages 2 0 R >>".into())),
        (
            2,
            Obj::Plain(
                "<< /Type /Pages /Kids [3 0 R] /Count 1 /MediaBox [0 0 50 50] >>".into(),
            ),
        ),
        (
            3,
            Obj::Plain("<< /Type /Page /Parent 2 0 R /Contents 4 0 R >>".into()),
        ),
        (4, Obj::Stream("/Filter /FlateDecode".into(), compressed)),
    ];

    let doc = Document::open(Arc::new(build_pdf(objects))).unwrap();
    let pix = tarn::render_page(&doc, 0, &RenderOptions::default()).unwrap();

    // User (25, 25) maps to device (25, 24).
    assert!(pixel(&pix, 25, 24)[0] < 10);
    assert_eq!(pixel(&pix, 5, 5), [255, 255, 255, 255]);
}
