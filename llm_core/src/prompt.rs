/// Build the script-writing prompt for an interview outline.
///
/// The model is asked for `Speaker1:` / `Speaker2:` lines so the result can
/// be fed straight into the audio pipeline.
pub fn interview_prompt(outline: &str) -> String {
    format!(
        "あなたは経験豊富な放送作家です。次の構成案をもとに、Speaker1 と Speaker2 による\
インタビュー番組のトークスクリプトを書いてください。\n\
\n\
守ってほしいこと:\n\
- 各発言の先頭に「Speaker1:」または「Speaker2:」を付ける\n\
- 親しみやすく自然な日本語の話し言葉にする\n\
- 1回の発言は1〜3文にする\n\
- やり取りはおよそ10〜15往復にする\n\
- 話題が途切れず自然につながるようにする\n\
\n\
構成案:\n\
{}\n\
\n\
トークスクリプト:",
        outline.trim()
    )
}
