use crate::models::EqBand;

/// Format EQ bands as the pipe-separated parameter string the device
/// consumes: `index,filter,freq,gain,q|...` with gain to one decimal place,
/// q to two, and unset fields left empty.
pub fn eq_bands_to_param_string(bands: &[EqBand]) -> String {
    bands
        .iter()
        .map(|band| {
            let filter = band.filter.map(|f| f.as_str()).unwrap_or("");
            let freq = band.freq.map(|v| v.to_string()).unwrap_or_default();
            let gain = band.gain.map(|v| format!("{:.1}", v)).unwrap_or_default();
            let q = band.q.map(|v| format!("{:.2}", v)).unwrap_or_default();
            format!("{},{},{},{},{}", band.index, filter, freq, gain, q)
        })
        .collect::<Vec<_>>()
        .join("|")
}
