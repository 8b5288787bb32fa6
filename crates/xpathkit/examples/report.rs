use std::collections::HashMap;
use xpathkit::{Value, XmlDocument, run};

fn main() {
    let doc = XmlDocument::parse(
        r#"<report>
             <entries>
               <amount currency="EUR">1400</amount>
               <amount currency="USD">12100</amount>
               <amount currency="EUR">15000</amount>
             </entries>
           </report>"#,
    )
    .unwrap();

    let vars = HashMap::from([("cur".to_string(), Value::from("EUR"))]);
    for expr in [
        "count(//amount)",
        "sum(//amount[@currency = $cur])",
        "for $a in //amount return $a idiv 100",
        "every $a in //amount satisfies $a > 1000",
    ] {
        match run(expr, &vars, Some(&doc)) {
            Ok(value) => println!("{expr} => {value}"),
            Err(error) => println!("{expr} failed: {error}"),
        }
    }
}
