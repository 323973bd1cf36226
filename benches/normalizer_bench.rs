use catalog_crawler::normalizer::{Normalizer, extract_detail};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

// A detail page with `tables` specification tables in rotating row shapes,
// plus one compatibility and one reference table
fn detail_page(tables: usize) -> String {
    let mut html = String::from("<html><body><h2 class=\"item-description\">Radiator</h2>");
    for t in 0..tables {
        html.push_str("<table>");
        for r in 0..6 {
            let row = match (t + r) % 3 {
                0 => format!("<tr><td></td><td>Key {t}-{r}</td><td>Value {r}</td></tr>"),
                1 => format!("<tr><td>Key {t}-{r}:</td><td>Value {r}</td></tr>"),
                _ => format!("<tr><td>Key {t}-{r}: Value {r}</td></tr>"),
            };
            html.push_str(&row);
        }
        html.push_str("</table>");
    }
    html.push_str("<table><tr><th>Make</th><th>Model</th></tr><tr><td>Honda</td><td>Accord</td></tr></table>");
    html.push_str("<table><tr><th>Reference Number</th><th>Reference Name</th></tr><tr><td>19010</td><td>OE</td></tr></table>");
    html.push_str("</body></html>");
    html
}

fn list_page(items: usize) -> String {
    let mut html = String::from("<html><body><div class=\"panel\"><div class=\"panel-heading\">Radiators</div>");
    for i in 0..items {
        html.push_str(&format!(
            "<div class=\"product-item\"><a href=\"/items/{i}\">{i}</a><h4>{i} - Radiator</h4>\
             <img class=\"primary\" src=\"/img/{i}.jpg\"><table><tr><td>Rows: 2</td></tr></table></div>"
        ));
    }
    html.push_str("</div></body></html>");
    html
}

fn bench_detail_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("detail_extraction");
    for tables in [5, 25, 100] {
        let html = detail_page(tables);
        group.bench_with_input(BenchmarkId::from_parameter(tables), &html, |b, html| {
            b.iter(|| extract_detail(black_box(html)))
        });
    }
    group.finish();
}

fn bench_list_extraction(c: &mut Criterion) {
    let normalizer = Normalizer::new("CSF-");
    let mut group = c.benchmark_group("list_extraction");
    for items in [10, 100] {
        let html = list_page(items);
        group.bench_with_input(BenchmarkId::from_parameter(items), &html, |b, html| {
            b.iter(|| normalizer.extract_list_page(black_box(html)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_detail_extraction, bench_list_extraction);
criterion_main!(benches);
