use super::{ComparisonPlot, PlotStyle};
use crate::error::Result;
use serde::Serialize;

#[derive(Serialize)]
struct Payload<'a> {
    plot: &'a ComparisonPlot,
    style: &'a PlotStyle,
}

/// Render a self-contained HTML comparison plot (data embedded as JSON).
///
/// The template is filled with `replace` rather than `format!()`: the script
/// is full of `{}` from JS template literals.
pub fn render_comparison_html(plot: &ComparisonPlot, style: &PlotStyle) -> Result<String> {
    // Embedded as a JS object literal; "</" would end the script element.
    let json = serde_json::to_string(&Payload { plot, style })?.replace("</", "<\\/");

    const TEMPLATE: &str = r##"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>__TITLE__</title>
<style>
  body { font-family: system-ui, -apple-system, Segoe UI, Roboto, Arial, sans-serif; margin: 0; }
  header { padding: 12px 16px; border-bottom: 1px solid #ddd; }
  .summary { display: flex; gap: 16px; flex-wrap: wrap; font-size: 14px; color: #333; }
  .pill { padding: 4px 8px; border: 1px solid #ddd; border-radius: 999px; background: #fafafa; }
  .main { padding: 12px 16px; }
  svg text { font-size: 13px; fill: #222; }
  .axis line, .axis path { stroke: #222; }
  .grid { stroke: #eee; }
  table { border-collapse: collapse; margin-top: 12px; }
  th, td { border-bottom: 1px solid #eee; padding: 6px 8px; text-align: left; font-size: 14px; }
  .num { text-align: right; font-variant-numeric: tabular-nums; }
</style>
</head>
<body>
<header>
  <div class="summary" id="summary"></div>
</header>
<div class="main">
  <svg id="plot" width="820" height="760"></svg>
  <table id="yields">
    <thead><tr><th>Component</th><th class="num">Yield</th><th class="num">Uncertainty</th></tr></thead>
    <tbody></tbody>
  </table>
</div>

<script>
const DATA = __DATA__;
const P = DATA.plot, S = DATA.style;
const NS = "http://www.w3.org/2000/svg";

function el(tag, attrs, parent) {
  const e = document.createElementNS(NS, tag);
  for (const [k, v] of Object.entries(attrs || {})) e.setAttribute(k, v);
  if (parent) parent.appendChild(e);
  return e;
}

function text(str, attrs, parent) {
  const t = el("text", attrs, parent);
  t.textContent = str;
  return t;
}

function fmt(x) {
  return Math.abs(x) >= 100 ? x.toFixed(1) : x.toPrecision(3);
}

function renderSummary() {
  const pills = [];
  pills.push(`<span class="pill"><b>CMS</b> ${S.title || P.name}</span>`);
  if (S.lumi !== null) pills.push(`<span class="pill">${S.lumi} fb<sup>-1</sup>${S.year ? " (" + S.year + ")" : ""}</span>`);
  pills.push(`<span class="pill">bins: ${P.centers.length}</span>`);
  document.getElementById("summary").innerHTML = pills.join("");
}

function renderYields() {
  const body = document.querySelector("#yields tbody");
  const rows = P.mc.map(l => [l.label, l.sumw.reduce((a, b) => a + b, 0), Math.hypot(...l.errors)]);
  rows.push(["Total simulation", P.yields.mc.sumw, Math.sqrt(P.yields.mc.sumw2)]);
  rows.push([S.data_label, P.yields.data.sumw, Math.sqrt(P.yields.data.sumw2)]);
  for (const [name, y, e] of rows) {
    const tr = document.createElement("tr");
    tr.innerHTML = `<td>${name}</td><td class="num">${fmt(y)}</td><td class="num">${fmt(e)}</td>`;
    body.appendChild(tr);
  }
}

function panel(svg, top, height, yMin, yMax, logY) {
  const left = 80, width = 700;
  const xs = P.edges;
  const x = v => left + (v - xs[0]) / (xs[xs.length - 1] - xs[0]) * width;
  const y = logY
    ? v => top + height - (Math.log10(Math.max(v, yMin)) - Math.log10(yMin)) / (Math.log10(yMax) - Math.log10(yMin)) * height
    : v => top + height - (v - yMin) / (yMax - yMin) * height;
  const g = el("g", { class: "axis" }, svg);
  el("rect", { x: left, y: top, width: width, height: height, fill: "none", stroke: "#222" }, g);
  for (let i = 0; i <= 4; i++) {
    const v = logY ? yMin * Math.pow(yMax / yMin, i / 4) : yMin + (yMax - yMin) * i / 4;
    el("line", { x1: left, x2: left + width, y1: y(v), y2: y(v), class: "grid" }, g);
    text(fmt(v), { x: left - 6, y: y(v) + 4, "text-anchor": "end" }, g);
  }
  return { x, y, left, width, top, height };
}

function points(svg, ax, values, errors, color) {
  P.centers.forEach((c, i) => {
    if (values[i] === 0 && errors[i] === 0) return;
    el("line", { x1: ax.x(c), x2: ax.x(c), y1: ax.y(values[i] - errors[i]), y2: ax.y(values[i] + errors[i]), stroke: color }, svg);
    el("circle", { cx: ax.x(c), cy: ax.y(values[i]), r: 3, fill: color }, svg);
  });
}

function renderPlot() {
  const svg = document.getElementById("plot");
  const mainHeight = S.ratio ? 480 : 640;
  const maxData = Math.max(...P.data.sumw.map((v, i) => v + P.data.errors[i]), 0);
  const maxMc = Math.max(...P.mc_total.sumw, 0);
  const yMax = Math.max(maxData, maxMc, 1) * (S.log_y ? 10 : 1.3);
  const yMin = S.log_y ? 0.1 : 0;
  const ax = panel(svg, 20, mainHeight, yMin, yMax, S.log_y);

  // Stacked simulation, bottom layer first.
  const base = P.edges.slice(1).map(() => 0);
  for (const layer of P.mc) {
    layer.sumw.forEach((v, i) => {
      const lo = base[i], hi = base[i] + v;
      base[i] = hi;
      if (v <= 0) return;
      el("rect", {
        x: ax.x(P.edges[i]), width: ax.x(P.edges[i + 1]) - ax.x(P.edges[i]),
        y: ax.y(hi), height: Math.max(ax.y(lo) - ax.y(hi), 0),
        fill: layer.color, "fill-opacity": 0.7, stroke: layer.color,
      }, svg);
    });
  }
  points(svg, ax, P.data.sumw, P.data.errors, "black");

  // Legend
  const entries = [[S.data_label, "black"], ...P.mc.map(l => [l.label, l.color])];
  entries.forEach(([label, color], i) => {
    el("rect", { x: ax.left + ax.width - 160, y: 34 + 20 * i, width: 14, height: 12, fill: color }, svg);
    text(label, { x: ax.left + ax.width - 140, y: 45 + 20 * i }, svg);
  });
  text(S.y_label, { x: 18, y: 20 + mainHeight / 2, transform: `rotate(-90 18 ${20 + mainHeight / 2})`, "text-anchor": "middle" }, svg);

  let bottom = 20 + mainHeight;
  if (S.ratio) {
    const r = panel(svg, bottom + 10, 160, 0.5, 1.5, false);
    el("line", { x1: r.left, x2: r.left + r.width, y1: r.y(1), y2: r.y(1), stroke: "gray", "stroke-dasharray": "4 3" }, svg);
    const clamp = v => Math.min(Math.max(v, 0.5), 1.5);
    points(svg, r, P.ratio.values.map(clamp), P.ratio.errors, "black");
    text("Data / MC", { x: 18, y: bottom + 90, transform: `rotate(-90 18 ${bottom + 90})`, "text-anchor": "middle" }, svg);
    bottom += 170;
  }
  for (let i = 0; i <= 5; i++) {
    const v = P.edges[0] + (P.edges[P.edges.length - 1] - P.edges[0]) * i / 5;
    text(fmt(v), { x: ax.x(v), y: bottom + 18, "text-anchor": "middle" }, svg);
  }
  text(S.x_label, { x: ax.left + ax.width, y: bottom + 40, "text-anchor": "end" }, svg);
}

renderSummary();
renderPlot();
renderYields();
</script>
</body>
</html>
"##;

    let title = escape_html(if style.title.is_empty() { &plot.name } else { &style.title });
    Ok(TEMPLATE.replace("__TITLE__", &title).replace("__DATA__", &json))
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
